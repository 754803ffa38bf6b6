use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::error;

use relaysub::client::subscriber::run_subscriber;
use relaysub::config::{Settings, load_config};
use relaysub::transport::control::wait_for_exit;
use relaysub::transport::frame::ClientId;
use relaysub::transport::server::{bind, run_server};
use relaysub::utils::error::ServerError;
use relaysub::utils::logging;

#[derive(Debug, Parser)]
#[command(name = "relaysub", version, about = "Topic-based UDP to TCP pub/sub broker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the broker: UDP publishers and TCP subscribers on PORT.
    Server {
        /// Port for both the UDP and TCP sockets.
        port: u16,
    },
    /// Connect to a broker as a subscriber and read commands from stdin.
    Subscriber {
        /// Client id, 1 to 10 printable ASCII characters.
        id: ClientId,
        server_ip: Ipv4Addr,
        server_port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_config().map_err(ServerError::from) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    let result = match cli.command {
        Command::Server { port } => serve(settings, port).await.map_err(|e| e.to_string()),
        Command::Subscriber {
            id,
            server_ip,
            server_port,
        } => {
            let server = SocketAddr::from((server_ip, server_port));
            let input = BufReader::new(tokio::io::stdin());
            run_subscriber(id, server, input, tokio::io::stdout())
                .await
                .map_err(|e| e.to_string())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(mut settings: Settings, port: u16) -> Result<(), ServerError> {
    settings.server.port = port;
    let listeners = bind(&settings.server).await?;

    let shutdown = async {
        tokio::select! {
            _ = wait_for_exit(BufReader::new(tokio::io::stdin())) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };

    run_server(listeners, &settings.broker, shutdown).await
}
