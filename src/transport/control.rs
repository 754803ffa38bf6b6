use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Resolves once the operator types `exit`.
///
/// Any other line is rejected with a warning. If the input closes or fails,
/// this never resolves, so a broker started without a terminal keeps
/// running until some other shutdown signal fires.
pub async fn wait_for_exit<R>(input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "exit" => return,
                "" => {}
                other => warn!(command = other, "Invalid command. Only exit is accepted"),
            },
            Ok(None) => {
                debug!("Control input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read control input");
                break;
            }
        }
    }

    std::future::pending::<()>().await
}
