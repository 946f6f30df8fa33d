use crate::{
    error::{PapertrailError, PapertrailResult},
    global::SOCKET_PATH,
    ipc::{
        connect_to_socket,
        message::{MessageType, PapertrailMessage},
        PapertrailReadSock, PapertrailRequestResponse, PapertrailWriteSock,
    },
    logger::{init_logger, LoggerType},
    opts::{CommandOpts, SubscribeOpts},
    types::{ClientInfo, SubscriptionID},
    wifi::{ConnectionEvent, StateEvent},
};

use log::LevelFilter;
use std::process;

pub async fn send_server_command(
    socket_path: &str,
    command: &CommandOpts,
    max_attempt: u8,
) -> PapertrailResult<()> {
    let stream = connect_to_socket(socket_path, max_attempt, 100).await?;

    let response = stream
        .send_and_receive_message(PapertrailMessage::try_from(command)?)
        .await?;

    if response.message_type != MessageType::Response || !response.is_valid() {
        return Err(PapertrailError::InvalidResponse);
    }

    println!("{}", String::from_utf8_lossy(&response.payload));
    Ok(())
}

/// Attaches as a UI client and prints one JSON line per event until the
/// daemon goes away. While at least one listener is attached the daemon
/// runs in stopped mode and actively seeks the hotspot.
pub async fn start_client(opts: &SubscribeOpts, filter: LevelFilter) -> PapertrailResult<()> {
    init_logger(LoggerType::Client, filter)?;

    let subscription_id = match opts {
        SubscribeOpts::State => SubscriptionID::State,
        SubscribeOpts::Connection => SubscriptionID::Connection,
    };

    let stream = connect_to_socket(&SOCKET_PATH, 3, 100).await?;
    let info = ClientInfo::new(process::id(), subscription_id);
    stream
        .write_message(PapertrailMessage::try_from(&info)?)
        .await?;

    log::info!("Subscribed to {subscription_id}");

    loop {
        let message = match stream.read_message().await {
            Ok(message) => message,
            Err(e) => {
                log::error!("Lost connection to daemon: {e}");
                return Err(e);
            }
        };
        println!("{}", reformat_event(&message, subscription_id)?);
    }
}

fn reformat_event(
    message: &PapertrailMessage,
    subscription_id: SubscriptionID,
) -> PapertrailResult<String> {
    if !message.is_valid() {
        return Err(PapertrailError::InvalidMessage);
    }

    match subscription_id {
        SubscriptionID::State => {
            let event: StateEvent = bincode::deserialize(&message.payload)?;
            serde_json::to_string(&event).map_err(PapertrailError::JsonError)
        }
        SubscriptionID::Connection => {
            let event: ConnectionEvent = bincode::deserialize(&message.payload)?;
            serde_json::to_string(&event).map_err(PapertrailError::JsonError)
        }
    }
}
