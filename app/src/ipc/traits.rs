use super::message::PapertrailMessage;
use crate::error::{PapertrailError, PapertrailResult};

use std::time::Duration;
use tokio::{net::UnixStream, time::sleep};

pub trait PapertrailReadSock {
    async fn read_bytes(&self, buffer: &mut [u8]) -> PapertrailResult<usize>;

    async fn read_message(&self) -> PapertrailResult<PapertrailMessage>;
    async fn try_read_message(&self, max_attempt: u8) -> PapertrailResult<PapertrailMessage>;
}

pub trait PapertrailWriteSock {
    async fn write_bytes(&self, buffer: &[u8]) -> PapertrailResult<usize>;

    async fn write_message(&self, message: PapertrailMessage) -> PapertrailResult<usize>;
    async fn try_write_message(
        &self,
        message: &PapertrailMessage,
        max_attempt: u8,
    ) -> PapertrailResult<usize>;
}

pub trait PapertrailRequestResponse {
    async fn send_and_receive_message(
        &self,
        message: PapertrailMessage,
    ) -> PapertrailResult<PapertrailMessage>;
}

pub async fn connect_to_socket(
    socket_path: &str,
    max_attempt: u8,
    delay: u64,
) -> PapertrailResult<UnixStream> {
    for attempt in 0..max_attempt {
        if let Ok(stream) = UnixStream::connect(socket_path).await {
            return Ok(stream);
        }
        log::debug!("Try connect: {} | Attempt: {}", socket_path, attempt + 1);
        sleep(Duration::from_millis(delay)).await;
    }

    log::warn!("Failed to connect to socket: {socket_path}");
    Err(PapertrailError::IpcError)
}
