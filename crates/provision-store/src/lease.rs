use std::time::Duration;

use chrono::{DateTime, Utc};
use provision_common::types::ChainName;
use serde::{Deserialize, Serialize};
use sled::Tree;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{decode, encode, StoreError};

/// Exclusive right to run a deployment on one chain until `expires_at`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub chain: ChainName,
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn expiry(from: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| StoreError::InvalidTtl(e.to_string()))?;
    from.checked_add_signed(ttl)
        .ok_or_else(|| StoreError::InvalidTtl(format!("{ttl} overflows")))
}

impl Lease {
    fn new(chain: ChainName, ttl: Duration) -> Result<Self, StoreError> {
        let acquired_at = Utc::now();
        Ok(Self {
            chain,
            holder: Uuid::new_v4(),
            acquired_at,
            expires_at: expiry(acquired_at, ttl)?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Per-chain leases in their own sled tree, so concurrent processes sharing
/// the database also exclude each other.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    tree: Tree,
}

impl LeaseManager {
    pub(crate) fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Takes the lease for `chain`, or fails with [`StoreError::LeaseHeld`]
    /// while another unexpired lease exists. Expired leases are taken over.
    pub fn acquire(&self, chain: &ChainName, ttl: Duration) -> Result<LeaseGuard, StoreError> {
        loop {
            let current = self.tree.get(chain.as_str())?;
            if let Some(bytes) = &current {
                let existing: Lease = decode(bytes)?;
                if !existing.is_expired(Utc::now()) {
                    return Err(StoreError::LeaseHeld {
                        chain: chain.clone(),
                        holder: existing.holder,
                        expires_at: existing.expires_at,
                    });
                }
                warn!(%chain, holder = %existing.holder, "taking over expired lease");
            }

            let lease = Lease::new(chain.clone(), ttl)?;
            match self
                .tree
                .compare_and_swap(chain.as_str(), current, Some(encode(&lease)?))?
            {
                Ok(()) => {
                    self.tree.flush()?;
                    info!(
                        %chain,
                        holder = %lease.holder,
                        expires_at = %lease.expires_at,
                        "lease acquired"
                    );
                    return Ok(LeaseGuard {
                        lease,
                        manager: self.clone(),
                        released: false,
                    });
                }
                Err(_) => debug!(%chain, "lease changed concurrently, retrying"),
            }
        }
    }

    /// Removes the lease only if `lease.holder` still owns it.
    pub fn release(&self, lease: &Lease) -> Result<bool, StoreError> {
        loop {
            let Some(current) = self.tree.get(lease.chain.as_str())? else {
                return Ok(false);
            };
            let stored: Lease = decode(&current)?;
            if stored.holder != lease.holder {
                return Ok(false);
            }
            match self
                .tree
                .compare_and_swap(lease.chain.as_str(), Some(current), None::<Vec<u8>>)?
            {
                Ok(()) => {
                    self.tree.flush()?;
                    info!(chain = %lease.chain, holder = %lease.holder, "lease released");
                    return Ok(true);
                }
                Err(_) => continue,
            }
        }
    }

    /// Pushes the expiry of `lease` to `ttl` from now. Fails with
    /// [`StoreError::LeaseLost`] once another holder has taken the chain, even
    /// if `lease` had expired unnoticed in between.
    pub fn renew(&self, lease: &Lease, ttl: Duration) -> Result<Lease, StoreError> {
        let lost = || {
            StoreError::LeaseLost {
                chain: lease.chain.clone(),
                holder: lease.holder,
            }
        };
        loop {
            let current = self.tree.get(lease.chain.as_str())?;
            let Some(bytes) = &current else {
                return Err(lost());
            };
            let stored: Lease = decode(bytes)?;
            if stored.holder != lease.holder {
                return Err(lost());
            }

            let renewed = Lease {
                expires_at: expiry(Utc::now(), ttl)?,
                ..stored
            };
            match self
                .tree
                .compare_and_swap(lease.chain.as_str(), current, Some(encode(&renewed)?))?
            {
                Ok(()) => {
                    self.tree.flush()?;
                    debug!(
                        chain = %lease.chain,
                        holder = %lease.holder,
                        expires_at = %renewed.expires_at,
                        "lease renewed"
                    );
                    return Ok(renewed);
                }
                Err(_) => debug!(chain = %lease.chain, "lease changed concurrently, retrying"),
            }
        }
    }

    pub fn current(&self, chain: &ChainName) -> Result<Option<Lease>, StoreError> {
        self.tree
            .get(chain.as_str())?
            .map(|v| decode(&v))
            .transpose()
    }
}

/// Releases its lease when dropped, whichever way the deployment ended.
#[derive(Debug)]
pub struct LeaseGuard {
    lease: Lease,
    manager: LeaseManager,
    released: bool,
}

impl LeaseGuard {
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    pub fn renew(&mut self, ttl: Duration) -> Result<(), StoreError> {
        self.lease = self.manager.renew(&self.lease, ttl)?;
        Ok(())
    }

    pub fn release(mut self) -> Result<bool, StoreError> {
        self.released = true;
        self.manager.release(&self.lease)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.manager.release(&self.lease) {
            warn!(chain = %self.lease.chain, "failed to release lease, it will expire: {e}");
        }
    }
}
