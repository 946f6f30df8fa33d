use super::{
    message::PapertrailMessage, PapertrailReadSock, PapertrailRequestResponse, PapertrailWriteSock,
};
use crate::{
    error::{PapertrailError, PapertrailResult},
    global::BUFFER_SIZE,
};

use tokio::net::{unix::OwnedWriteHalf, UnixStream};

impl PapertrailReadSock for UnixStream {
    async fn read_bytes(&self, buffer: &mut [u8]) -> PapertrailResult<usize> {
        if let Err(e) = self.readable().await {
            log::error!("Unreadable. Error: {e}");
            return Err(PapertrailError::IpcError);
        }

        match self.try_read(buffer) {
            Ok(len) if len > 0 => Ok(len),
            Ok(_) => {
                log::debug!("Stream closed by peer.");
                Err(PapertrailError::IpcError)
            }
            Err(e) => {
                log::info!("Can't read from stream. Error: {e}");
                Err(PapertrailError::IpcError)
            }
        }
    }

    async fn read_message(&self) -> PapertrailResult<PapertrailMessage> {
        let mut buffer = vec![0; *BUFFER_SIZE];
        match self.read_bytes(&mut buffer).await {
            Ok(len) if len > 0 => buffer[..len].try_into(),
            Ok(_) | Err(_) => Err(PapertrailError::IpcError),
        }
    }

    async fn try_read_message(&self, max_attempt: u8) -> PapertrailResult<PapertrailMessage> {
        for attempt in 0..max_attempt {
            match self.read_message().await {
                Ok(message) => return Ok(message),
                Err(_) => log::warn!("Retry {}/{}", attempt + 1, max_attempt),
            }
        }
        log::error!("Out of attempt");
        Err(PapertrailError::IpcError)
    }
}

impl PapertrailWriteSock for UnixStream {
    async fn write_bytes(&self, buffer: &[u8]) -> PapertrailResult<usize> {
        if let Err(e) = self.writable().await {
            log::error!("Unwritable. Error: {e}");
            return Err(PapertrailError::IpcError);
        }

        match self.try_write(buffer) {
            Ok(len) if len == buffer.len() => Ok(len),
            Ok(len) => {
                log::warn!("Can't write all message. {len} bytes were written.");
                Err(PapertrailError::IpcError)
            }
            Err(e) => {
                log::info!("Can't write to stream. Error: {e}");
                Err(PapertrailError::IpcError)
            }
        }
    }

    async fn write_message(&self, message: PapertrailMessage) -> PapertrailResult<usize> {
        let buffer: Vec<u8> = message.into();
        self.write_bytes(&buffer).await
    }

    async fn try_write_message(
        &self,
        message: &PapertrailMessage,
        max_attempt: u8,
    ) -> PapertrailResult<usize> {
        for attempt in 0..max_attempt {
            match self.write_message(message.clone()).await {
                Ok(len) => return Ok(len),
                Err(_) => log::warn!("Retry {}/{}", attempt + 1, max_attempt),
            }
        }
        log::error!("Out of attempt.");
        Err(PapertrailError::IpcError)
    }
}

impl PapertrailRequestResponse for UnixStream {
    async fn send_and_receive_message(
        &self,
        message: PapertrailMessage,
    ) -> PapertrailResult<PapertrailMessage> {
        self.write_message(message).await?;
        self.read_message().await
    }
}

impl PapertrailWriteSock for OwnedWriteHalf {
    async fn write_bytes(&self, buffer: &[u8]) -> PapertrailResult<usize> {
        if let Err(e) = self.writable().await {
            log::error!("Unwritable. Error: {e}");
            return Err(PapertrailError::IpcError);
        }

        match self.try_write(buffer) {
            Ok(len) if len == buffer.len() => Ok(len),
            Ok(len) => {
                log::warn!("Can't write all message. {len} bytes were written.");
                Err(PapertrailError::IpcError)
            }
            Err(e) => {
                log::info!("Can't write to stream. Error: {e}");
                Err(PapertrailError::IpcError)
            }
        }
    }

    async fn write_message(&self, message: PapertrailMessage) -> PapertrailResult<usize> {
        let buffer: Vec<u8> = message.into();
        self.write_bytes(&buffer).await
    }

    async fn try_write_message(
        &self,
        message: &PapertrailMessage,
        max_attempt: u8,
    ) -> PapertrailResult<usize> {
        for attempt in 0..max_attempt {
            match self.write_message(message.clone()).await {
                Ok(len) => return Ok(len),
                Err(_) => log::warn!("Retry {}/{}", attempt + 1, max_attempt),
            }
        }
        log::error!("Out of attempt.");
        Err(PapertrailError::IpcError)
    }
}
