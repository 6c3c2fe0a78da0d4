use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("fs error: {0}")]
    Fs(#[from] provision_common::fs::error::Error),
    #[error("cfg error: {0}")]
    Cfg(#[from] provision_config::Error),
    #[error("store error: {0}")]
    Store(#[from] provision_store::StoreError),
    #[error("rpc client error: {0}")]
    RpcClient(#[from] provision_rpc::rpc_client::RpcClientError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file already exists: {0}")]
    FileExists(PathBuf),

    #[error("error: {0}")]
    Other(#[from] anyhow::Error),
}
