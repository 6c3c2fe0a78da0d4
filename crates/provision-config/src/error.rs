use provision_common::types::ChainName;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde_json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("fs error: {0}")]
    Fs(#[from] provision_common::fs::error::Error),
    #[error("settings file not found: {0}")]
    SettingsNotFound(std::path::PathBuf),
    #[error("chain {0} is not configured")]
    UnknownChain(ChainName),
    #[error("chain {0} has no configured RPC endpoints")]
    NoEndpoints(ChainName),
    #[error("deployment signing key is not configured, set {env}")]
    MissingSigningKey { env: String },
    #[error("deployment signing key is invalid: {0}")]
    InvalidSigningKey(String),
    #[error("invalid minimum balance {value:?} for chain {chain}: {reason}")]
    InvalidAmount {
        chain: ChainName,
        value: String,
        reason: String,
    },
    #[error("invalid {provider} url for chain {chain}: {reason}")]
    InvalidProviderUrl {
        provider: String,
        chain: ChainName,
        reason: String,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}
