use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid base source: {0}")]
    InvalidBaseSource(String),
    #[error("Materialize rejected: {0}")]
    MaterializeRejected(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
