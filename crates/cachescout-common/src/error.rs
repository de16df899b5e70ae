use thiserror::Error;

#[derive(Error, Debug)]
pub enum CachescoutError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Malformed configuration response: {0}")]
    Parse(String),

    #[error("Unknown protocol '{0}', expected 'text' or 'binary'")]
    UnknownProtocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CachescoutError>;
