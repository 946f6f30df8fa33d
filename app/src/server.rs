use crate::{
    config::{self, ConfigStore},
    error::{PapertrailError, PapertrailResult},
    global::SUBSCRIBERS,
    ipc::{
        message::{MessageType, PapertrailMessage},
        PapertrailReadSock, PapertrailWriteSock,
    },
    opts::CommandOpts,
    types::{ClientInfo, SubscriptionID},
    wifi::{
        ConnectionEvent, ConnectivityService, NetworkProfile, NmcliControl, StateEvent,
        WifiControl,
    },
};

use std::{fs, sync::Arc, time::Duration};
use tokio::{
    io::AsyncReadExt,
    net::{unix::OwnedReadHalf, UnixListener, UnixStream},
    sync::mpsc,
    time::sleep,
};

pub async fn start_server(socket_path: &str) -> PapertrailResult<()> {
    if fs::metadata(socket_path).is_ok() {
        fs::remove_file(socket_path)?;
        log::debug!("Removed stale socket: {socket_path}");
    }

    log::info!("---------- START PAPERTRAIL CONNECTIVITY DAEMON ----------");

    let control: Arc<dyn WifiControl> = Arc::new(NmcliControl::detect().await?);
    let store = Arc::new(ConfigStore::open(config::default_config_path()));
    let service = Arc::new(ConnectivityService::new(control, store));
    service.initialize()?;

    spawn_event_forwarders(&service);

    log::info!("Try to bind on socket: {socket_path}");
    let listener = UnixListener::bind(socket_path)?;
    log::info!("Success");

    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(handle_connection(stream, Arc::clone(&service)));
    }

    service.dispose();
    Ok(())
}

/// Bridges service observers to the subscriber sockets. Observer callbacks
/// are synchronous; they only push into channels, the forwarder tasks do
/// the socket writes.
fn spawn_event_forwarders(service: &Arc<ConnectivityService>) {
    let (state_tx, state_rx) = mpsc::unbounded_channel::<StateEvent>();
    service.on_state_change(Box::new(move |state, previous| {
        let _ = state_tx.send(StateEvent { state, previous });
    }));

    let (conn_tx, conn_rx) = mpsc::unbounded_channel::<ConnectionEvent>();
    service.on_connection_change(Box::new(move |event| {
        let _ = conn_tx.send(event.clone());
    }));

    tokio::spawn(forward_events(
        SubscriptionID::State,
        state_rx,
        Arc::clone(service),
    ));
    tokio::spawn(forward_events(
        SubscriptionID::Connection,
        conn_rx,
        Arc::clone(service),
    ));
}

async fn forward_events<T: serde::Serialize>(
    subscription_id: SubscriptionID,
    mut events: mpsc::UnboundedReceiver<T>,
    service: Arc<ConnectivityService>,
) {
    while let Some(event) = events.recv().await {
        let payload = match bincode::serialize(&event) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to encode {subscription_id} event: {e}");
                continue;
            }
        };

        let evicted = broadcast(subscription_id, &PapertrailMessage::response(payload)).await;
        if evicted > 0 {
            service.set_client_count(subscriber_count().await).await;
        }
    }
}

async fn broadcast(subscription_id: SubscriptionID, message: &PapertrailMessage) -> usize {
    let mut subscribers = SUBSCRIBERS.lock().await;

    let streams = match subscribers.get_mut(&subscription_id) {
        Some(streams) if !streams.is_empty() => streams,
        Some(_) | None => return 0,
    };

    let mut disconnected = Vec::new();
    for (pid, stream) in streams.iter_mut() {
        if stream.try_write_message(message, 2).await.is_err() {
            log::debug!("Client {pid} is disconnected.");
            disconnected.push(*pid);
        }
    }

    for pid in &disconnected {
        log::info!("Remove {pid}");
        streams.remove(pid);
    }
    disconnected.len()
}

async fn subscriber_count() -> u32 {
    SUBSCRIBERS
        .lock()
        .await
        .values()
        .map(|streams| streams.len() as u32)
        .sum()
}

async fn handle_connection(
    stream: UnixStream,
    service: Arc<ConnectivityService>,
) -> PapertrailResult<()> {
    let message = stream.try_read_message(3).await?;

    match message.message_type {
        MessageType::Command => {
            let command: CommandOpts = serde_json::from_slice(&message.payload)?;
            process_server_command(stream, command, service).await
        }
        MessageType::Subscription => {
            let info: ClientInfo = serde_json::from_slice(&message.payload)?;
            register_subscription(stream, info, service).await
        }
        MessageType::Response => Err(PapertrailError::InvalidMessage),
    }
}

async fn process_server_command(
    stream: UnixStream,
    command: CommandOpts,
    service: Arc<ConnectivityService>,
) -> PapertrailResult<()> {
    log::info!("Command from client: {command:?}");

    match command {
        CommandOpts::Kill => {
            let farewell = "Server is shutting down...";
            log::info!("{farewell}");
            let _ = stream
                .write_message(PapertrailMessage::response(farewell.into()))
                .await;
            sleep(Duration::from_millis(100)).await;
            service.dispose();
            std::process::exit(0);
        }
        CommandOpts::Ping => {
            stream
                .write_message(PapertrailMessage::response(b"pong".to_vec()))
                .await?;
        }
        CommandOpts::Status => {
            let report = serde_json::to_vec(&service.status().await)?;
            stream
                .write_message(PapertrailMessage::response(report))
                .await?;
        }
        CommandOpts::SetHotspot { ssid, password } => {
            let reply = match service.set_hotspot_config(&ssid, &password).await {
                Ok(()) => format!("Hotspot target set to {ssid}"),
                Err(e) => format!("Rejected: {e}"),
            };
            stream
                .write_message(PapertrailMessage::response(reply.into_bytes()))
                .await?;
        }
        CommandOpts::Scan => {
            let reply = match service.scan().await {
                Ok(access_points) => serde_json::to_vec(&access_points)?,
                Err(e) => format!("Scan failed: {e}").into_bytes(),
            };
            stream
                .write_message(PapertrailMessage::response(reply))
                .await?;
        }
        CommandOpts::Networks => {
            let reply = match service.saved_networks().await {
                Ok(profiles) => serde_json::to_vec(&profiles)?,
                Err(e) => format!("Listing failed: {e}").into_bytes(),
            };
            stream
                .write_message(PapertrailMessage::response(reply))
                .await?;
        }
        CommandOpts::Forget { ssid } => {
            let reply = match service.forget_network(&ssid).await {
                Ok(()) => format!("Forgot network {ssid}"),
                Err(e) => format!("Rejected: {e}"),
            };
            stream
                .write_message(PapertrailMessage::response(reply.into_bytes()))
                .await?;
        }
        CommandOpts::SaveNetwork {
            ssid,
            password,
            auto_connect,
        } => {
            let profile = NetworkProfile {
                ssid: ssid.clone(),
                password,
                auto_connect,
            };
            let reply = match service.save_network(&profile).await {
                Ok(()) => format!("Saved network profile {ssid}"),
                Err(e) => format!("Rejected: {e}"),
            };
            stream
                .write_message(PapertrailMessage::response(reply.into_bytes()))
                .await?;
        }
    }
    Ok(())
}

async fn register_subscription(
    stream: UnixStream,
    info: ClientInfo,
    service: Arc<ConnectivityService>,
) -> PapertrailResult<()> {
    log::info!(
        "Client pid {} subscribes to {}",
        info.process_id,
        info.subscription_id
    );

    // Send the current value right away so the client can render without
    // waiting for the next edge.
    let snapshot = match info.subscription_id {
        SubscriptionID::State => {
            let state = service.state();
            bincode::serialize(&StateEvent {
                state,
                previous: state,
            })?
        }
        SubscriptionID::Connection => {
            let current = service.current_connection().await.unwrap_or(None);
            bincode::serialize(&ConnectionEvent {
                connected: current.is_some(),
                ssid: current.map(|connection| connection.ssid),
            })?
        }
    };
    stream
        .write_message(PapertrailMessage::response(snapshot))
        .await?;

    let (read_half, write_half) = stream.into_split();
    {
        let mut subscribers = SUBSCRIBERS.lock().await;
        subscribers
            .entry(info.subscription_id)
            .or_default()
            .insert(info.process_id, write_half);
    }

    service.set_client_count(subscriber_count().await).await;
    log::info!("Client connected.");

    tokio::spawn(watch_client(read_half, info, service));
    Ok(())
}

/// Blocks on the read half until the client goes away, then detaches it so
/// the mode tracker sees the departure even when no broadcast was pending.
async fn watch_client(
    mut read_half: OwnedReadHalf,
    info: ClientInfo,
    service: Arc<ConnectivityService>,
) {
    let mut buffer = [0u8; 64];
    loop {
        match read_half.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {} // subscribers have nothing more to say
        }
    }

    {
        let mut subscribers = SUBSCRIBERS.lock().await;
        if let Some(streams) = subscribers.get_mut(&info.subscription_id) {
            streams.remove(&info.process_id);
        }
    }

    log::info!("Client pid {} detached.", info.process_id);
    service.set_client_count(subscriber_count().await).await;
}
