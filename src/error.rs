use thiserror::Error;

/// Main error type for Routelens operations
#[derive(Error, Debug)]
pub enum RoutelensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Routes manifest error: {0}")]
    Manifest(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

pub type Result<T> = std::result::Result<T, RoutelensError>;
