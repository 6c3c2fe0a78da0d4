use chrono::{DateTime, Utc};
use provision_common::types::ChainName;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("bincode error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("no deployment recorded for chain {0}")]
    NotFound(ChainName),
    #[error("a deployment on {chain} is already in progress (holder {holder}, expires {expires_at})")]
    LeaseHeld {
        chain: ChainName,
        holder: Uuid,
        expires_at: DateTime<Utc>,
    },
    #[error("lease on {chain} held by {holder} was lost to another deployment")]
    LeaseLost { chain: ChainName, holder: Uuid },
    #[error("invalid lease ttl: {0}")]
    InvalidTtl(String),
}
