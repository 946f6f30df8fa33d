use std::{fmt::Display, io, result::Result};

pub type PapertrailResult<T> = Result<T, PapertrailError>;

#[derive(Debug)]
pub enum PapertrailError {
    DaemonRunning,
    NoDaemon,
    NotInitialized,
    ControlPlaneUnavailable,
    ScanFailed,
    NetworkNotFound,
    AuthFailed,
    ConnectionFailed,
    Timeout,
    VerificationFailed,
    Aborted,
    AlreadyInProgress,
    FallbackReconnectFailed,
    Validation(String),
    JsonError(serde_json::Error),
    BincodeError(bincode::Error),
    IoError(io::Error),
    IpcError,
    ParseError,
    NoSubscriber,
    LoggerError,
    InvalidMessage,
    InvalidResponse,
}

impl From<io::Error> for PapertrailError {
    fn from(value: io::Error) -> Self {
        PapertrailError::IoError(value)
    }
}

impl From<serde_json::Error> for PapertrailError {
    fn from(value: serde_json::Error) -> Self {
        PapertrailError::JsonError(value)
    }
}

impl From<bincode::Error> for PapertrailError {
    fn from(value: bincode::Error) -> Self {
        PapertrailError::BincodeError(value)
    }
}

impl From<std::num::ParseIntError> for PapertrailError {
    fn from(_: std::num::ParseIntError) -> Self {
        PapertrailError::ParseError
    }
}

impl From<fern::InitError> for PapertrailError {
    fn from(_: fern::InitError) -> Self {
        PapertrailError::LoggerError
    }
}

impl Display for PapertrailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PapertrailError::DaemonRunning => write!(f, "Daemon is already running"),
            PapertrailError::NoDaemon => write!(f, "No daemon found"),
            PapertrailError::NotInitialized => write!(f, "Service is not initialized"),
            PapertrailError::ControlPlaneUnavailable => {
                write!(f, "WiFi management tooling is unavailable")
            }
            PapertrailError::ScanFailed => write!(f, "WiFi scan failed"),
            PapertrailError::NetworkNotFound => write!(f, "Network is not visible"),
            PapertrailError::AuthFailed => write!(f, "Authentication rejected"),
            PapertrailError::ConnectionFailed => write!(f, "Connection failed"),
            PapertrailError::Timeout => write!(f, "Connection attempt timed out"),
            PapertrailError::VerificationFailed => {
                write!(f, "Connected network does not match the target")
            }
            PapertrailError::Aborted => write!(f, "Connection attempt aborted"),
            PapertrailError::AlreadyInProgress => {
                write!(f, "A connection attempt is already in flight")
            }
            PapertrailError::FallbackReconnectFailed => {
                write!(f, "Reconnect to fallback network failed")
            }
            PapertrailError::Validation(reason) => write!(f, "Invalid input: {}", reason),
            PapertrailError::JsonError(err) => write!(f, "Serde json error: {}", err),
            PapertrailError::BincodeError(err) => write!(f, "Serde bincode error: {}", err),
            PapertrailError::IoError(err) => write!(f, "IO error: {}", err),
            PapertrailError::IpcError => write!(f, "Inter-processes communication error"),
            PapertrailError::ParseError => write!(f, "Parse error"),
            PapertrailError::NoSubscriber => write!(f, "No subscriber"),
            PapertrailError::LoggerError => write!(f, "Cannot init logger"),
            PapertrailError::InvalidMessage => write!(f, "Invalid message"),
            PapertrailError::InvalidResponse => write!(f, "Invalid response"),
        }
    }
}
