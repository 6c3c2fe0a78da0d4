use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde_json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("invalid home dir")]
    InvalidHomeDir,
    #[error("path has no parent directory: {0}")]
    NoParent(std::path::PathBuf),
}
