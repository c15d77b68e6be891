use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaystreamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PaystreamError {
    /// Short error code string, attached to startup log lines.
    pub fn code(&self) -> &'static str {
        match self {
            PaystreamError::Config(_) => "CONFIG_ERROR",
            PaystreamError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PaystreamError>;
