pub mod error;
pub mod lease;

use std::path::Path;

use provision_common::types::{ChainName, DeploymentRecord, DeploymentSummary};
use serde::{de::DeserializeOwned, Serialize};
use sled::Tree;
use tracing::{debug, error, info};

pub use crate::{
    error::StoreError,
    lease::{Lease, LeaseGuard, LeaseManager},
};

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

/// One [`DeploymentRecord`] per chain, keyed by chain name.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    deployments: Tree,
    leases: LeaseManager,
}

impl DeploymentStore {
    const DB_CACHE_CAPACITY: u64 = 10 * 1024 * 1024;

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::Config::default()
            .path(&path)
            .flush_every_ms(Some(1000))
            .cache_capacity(Self::DB_CACHE_CAPACITY)
            .open()
            .inspect_err(|e| error!("sled err: {e}"))?;
        info!(path = %path.as_ref().display(), "opened deployment store");
        Self::from_db(&db)
    }

    /// A store that lives only as long as the process.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    fn from_db(db: &sled::Db) -> Result<Self, StoreError> {
        let deployments = db.open_tree("deployments")?;
        let leases = LeaseManager::new(db.open_tree("leases")?);
        Ok(Self {
            deployments,
            leases,
        })
    }

    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Replaces whatever was stored for `record.chain` in a single write.
    pub fn upsert(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        let previous = self
            .deployments
            .insert(record.chain.as_str(), encode(record)?)?;
        self.deployments.flush()?;
        debug!(
            chain = %record.chain,
            replaced = previous.is_some(),
            contracts = record.contract_addresses.len(),
            "stored deployment record"
        );
        Ok(())
    }

    pub fn get(&self, chain: &ChainName) -> Result<Option<DeploymentRecord>, StoreError> {
        self.deployments
            .get(chain.as_str())?
            .map(|v| decode(&v))
            .transpose()
    }

    /// Sets `verified` without touching the address map. Returns whether the
    /// flag changed, so a second call is a successful no-op.
    pub fn mark_verified(&self, chain: &ChainName) -> Result<bool, StoreError> {
        loop {
            let Some(current) = self.deployments.get(chain.as_str())? else {
                return Err(StoreError::NotFound(chain.clone()));
            };

            let mut record: DeploymentRecord = decode(&current)?;
            if record.verified {
                return Ok(false);
            }
            record.verified = true;

            match self.deployments.compare_and_swap(
                chain.as_str(),
                Some(current),
                Some(encode(&record)?),
            )? {
                Ok(()) => {
                    self.deployments.flush()?;
                    return Ok(true);
                }
                Err(_) => debug!(%chain, "record changed while verifying, retrying"),
            }
        }
    }

    pub fn list_all(&self) -> Result<Vec<DeploymentSummary>, StoreError> {
        self.deployments
            .iter()
            .values()
            .map(|v| -> Result<DeploymentSummary, StoreError> {
                let record: DeploymentRecord = decode(&v?)?;
                Ok(record.summary())
            })
            .collect()
    }
}
