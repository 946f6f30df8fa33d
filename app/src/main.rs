mod client;
mod config;
mod error;
mod global;
mod ipc;
mod logger;
mod opts;
mod server;
mod types;
mod wifi;

use crate::{
    error::{PapertrailError, PapertrailResult},
    logger::{init_logger, LoggerType},
    opts::{Action, CommandOpts, Opts},
};

#[tokio::main]
async fn main() -> PapertrailResult<()> {
    let opts = Opts::from_env();
    run(&opts).await
}

async fn run(opts: &Opts) -> PapertrailResult<()> {
    let level_filter = if opts.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    match &opts.action {
        Action::Daemon => init_logger(LoggerType::Server, level_filter)?,
        Action::Command(_) => init_logger(LoggerType::Command, level_filter)?,
        _ => {}
    };

    let socket_path = global::SOCKET_PATH.as_str();
    let server_running = check_server_alive(socket_path).await?;

    match &opts.action {
        Action::Daemon => {
            if server_running {
                log::error!("Daemon is already running.");
                return Err(PapertrailError::DaemonRunning);
            }
            server::start_server(socket_path).await
        }
        Action::Command(command) => {
            if !server_running {
                log::error!("Daemon is not running.");
                return Err(PapertrailError::NoDaemon);
            }
            client::send_server_command(socket_path, command, 3).await
        }
        Action::Listen(subscription) => client::start_client(subscription, level_filter).await,
    }
}

async fn check_server_alive(socket_path: &str) -> PapertrailResult<bool> {
    log::debug!("Socket: {socket_path}");

    if std::fs::metadata(socket_path).is_err() {
        log::debug!("Daemon is not running");
        return Ok(false);
    }

    if client::send_server_command(socket_path, &CommandOpts::Ping, 1)
        .await
        .is_err()
    {
        if let Err(e) = std::fs::remove_file(socket_path) {
            log::error!("Failed to remove old socket. Error: {}", e);
        } else {
            log::debug!("Removed old socket.");
        }
        return Ok(false);
    }
    Ok(true)
}
