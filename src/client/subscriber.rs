//! The subscriber program.
//!
//! Connects, identifies, then waits on two inputs at once: operator commands
//! and frames from the broker. Each PUBLISH frame becomes one line of output.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::client::command::Command;
use crate::transport::codec::{read_frame, write_frame};
use crate::transport::frame::{
    ClientId, Frame, MAX_FRAME_LEN, encode_identify, encode_subscribe, encode_unsubscribe,
};
use crate::utils::error::{ClientError, CommandError};

/// Run a subscriber session until `exit`, or until the broker closes the
/// connection.
///
/// Commands are read from `input` and received values are written to
/// `output`, one per line. If `input` reaches EOF the session keeps
/// receiving.
pub async fn run_subscriber<R, W>(
    client_id: ClientId,
    server: SocketAddr,
    input: R,
    mut output: W,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let stream = TcpStream::connect(server)
        .await
        .map_err(|source| ClientError::Connect {
            addr: server.to_string(),
            source,
        })?;
    stream.set_nodelay(true)?;

    let (mut reader, mut writer) = stream.into_split();
    write_frame(&mut writer, &encode_identify(&client_id)).await?;
    info!(client = %client_id, %server, "Connected");

    let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN);
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line? else {
                    debug!("Command input closed");
                    input_open = false;
                    continue;
                };

                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(CommandError::Empty) => continue,
                    Err(e) => {
                        warn!(error = %e, "Invalid command");
                        continue;
                    }
                };

                let (frame, confirmation) = match command {
                    Command::Exit => break,
                    Command::Subscribe { topic, store_and_forward } => (
                        encode_subscribe(&client_id, &topic, store_and_forward)?,
                        "Subscribed to topic.",
                    ),
                    Command::Unsubscribe { topic } => (
                        encode_unsubscribe(&client_id, &topic)?,
                        "Unsubscribed from topic.",
                    ),
                };
                write_frame(&mut writer, &frame).await?;
                write_line(&mut output, confirmation).await?;
            }

            inbound = read_frame(&mut reader, &mut buf) => match inbound? {
                Some(Frame::Publish(message)) => write_line(&mut output, &message.to_string()).await?,
                Some(other) => warn!(frame_type = ?other.frame_type(), "Unexpected frame from broker"),
                None => {
                    info!("Broker closed the connection");
                    break;
                }
            },
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}

async fn write_line<W>(output: &mut W, line: &str) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
