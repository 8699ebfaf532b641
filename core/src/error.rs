use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TapecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No audio output available: {0}")]
    DeviceUnavailable(String),

    #[error("Audio write failed: {0}")]
    HardwareWriteFailure(String),

    #[error("Worker thread error: {0}")]
    SessionThread(String),
}

pub type Result<T> = std::result::Result<T, TapecastError>;
