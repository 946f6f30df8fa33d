use crate::{error::PapertrailError, opts::CommandOpts, types::ClientInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Command = 0,
    Subscription = 1,
    Response = 2,
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = PapertrailError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Command),
            1 => Ok(MessageType::Subscription),
            2 => Ok(MessageType::Response),
            _ => Err(PapertrailError::ParseError),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PapertrailMessage {
    pub message_type: MessageType,
    pub header: usize, // size of payload
    pub payload: Vec<u8>,
}

impl PapertrailMessage {
    pub fn response(payload: Vec<u8>) -> Self {
        PapertrailMessage {
            message_type: MessageType::Response,
            header: payload.len(),
            payload,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.payload.len() == self.header
    }
}

impl TryFrom<&CommandOpts> for PapertrailMessage {
    type Error = PapertrailError;
    fn try_from(opts: &CommandOpts) -> Result<Self, Self::Error> {
        let payload = serde_json::to_vec(opts)?;
        Ok(PapertrailMessage {
            message_type: MessageType::Command,
            header: payload.len(),
            payload,
        })
    }
}

impl TryFrom<&ClientInfo> for PapertrailMessage {
    type Error = PapertrailError;
    fn try_from(info: &ClientInfo) -> Result<Self, Self::Error> {
        let payload = serde_json::to_vec(info)?;
        Ok(PapertrailMessage {
            message_type: MessageType::Subscription,
            header: payload.len(),
            payload,
        })
    }
}

impl From<PapertrailMessage> for Vec<u8> {
    fn from(message: PapertrailMessage) -> Self {
        let mut buffer = Vec::new();

        buffer.push(u8::from(message.message_type));
        buffer.extend_from_slice(&message.header.to_le_bytes());
        buffer.extend_from_slice(&message.payload);

        buffer
    }
}

impl TryFrom<&[u8]> for PapertrailMessage {
    type Error = PapertrailError;
    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        let metadata_len: usize = size_of::<u8>() + size_of::<usize>();

        if buffer.len() < metadata_len {
            return Err(PapertrailError::ParseError);
        }

        let message_type = MessageType::try_from(buffer[0])?;
        let header = usize::from_le_bytes(
            buffer[1..metadata_len]
                .try_into()
                .map_err(|_| PapertrailError::ParseError)?,
        );

        if buffer.len() < (metadata_len + header) {
            return Err(PapertrailError::ParseError);
        }

        let payload = buffer[metadata_len..(metadata_len + header)].to_vec();
        Ok(PapertrailMessage {
            message_type,
            header,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_survives_the_wire_format() {
        let message = PapertrailMessage::response(b"pong".to_vec());
        let raw: Vec<u8> = message.into();

        let decoded = PapertrailMessage::try_from(raw.as_slice()).unwrap();
        assert_eq!(decoded.message_type, MessageType::Response);
        assert!(decoded.is_valid());
        assert_eq!(decoded.payload, b"pong");
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let message = PapertrailMessage::response(b"status report".to_vec());
        let raw: Vec<u8> = message.into();

        assert!(PapertrailMessage::try_from(&raw[..4]).is_err());
        assert!(PapertrailMessage::try_from(&raw[..raw.len() - 1]).is_err());
    }
}
