use ethers::types::{Address, H256, U256};
use provision_common::types::{ChainName, DeploymentResult};
use provision_store::StoreError;
use serde::Serialize;

use crate::artifact::PlanError;

/// Failure talking to a node.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("cannot connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("signer error: {0}")]
    Signer(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("{call} on {endpoint} did not answer within {secs}s")]
    Timeout {
        call: &'static str,
        endpoint: String,
        secs: u64,
    },
}

/// Why one contract-creation transaction did not produce a contract.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to encode constructor: {0}")]
    Encode(String),
    #[error("gas estimation failed: {0}")]
    Estimate(String),
    #[error("transaction was not accepted: {0}")]
    Submit(String),
    #[error("failed to fetch receipt for {tx_hash:?}: {reason}")]
    Receipt { tx_hash: H256, reason: String },
    #[error("transaction {tx_hash:?} reverted")]
    Reverted { tx_hash: H256 },
    #[error("transaction {tx_hash:?} was not included within {secs}s")]
    ConfirmationTimeout { tx_hash: H256, secs: u64 },
    #[error("transaction {tx_hash:?} was dropped from the mempool")]
    Dropped { tx_hash: H256 },
    #[error("receipt for {tx_hash:?} has no contract address")]
    MissingAddress { tx_hash: H256 },
}

/// One failed candidate during provider selection.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointFailure {
    pub label: String,
    pub authenticated: bool,
    pub source_rank: usize,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("configuration error: {0}")]
    Config(#[from] provision_config::Error),
    #[error("chain {0} is not in the deployable allow-list")]
    ChainNotAllowed(ChainName),
    #[error("all {} RPC endpoints for {chain} failed", failures.len())]
    MultiEndpointFailure {
        chain: ChainName,
        failures: Vec<EndpointFailure>,
    },
    #[error("deployer {deployer:?} has {balance} wei on {chain}, {required} wei required")]
    InsufficientBalance {
        chain: ChainName,
        deployer: Address,
        balance: U256,
        required: U256,
    },
    #[error("{artifact} references {dependency}, which has not been deployed")]
    DependencyUnresolved { artifact: String, dependency: String },
    #[error("deploying {artifact} failed: {source}")]
    Deploy {
        artifact: String,
        #[source]
        source: DeployError,
    },
    #[error("deployment succeeded on-chain but could not be stored: {0}")]
    Store(#[source] StoreError),
    #[error("{0}")]
    LeaseHeld(#[source] StoreError),
    #[error("invalid deployment plan: {0}")]
    Plan(#[from] PlanError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

impl ProvisionError {
    /// Stable snake_case name for responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::ChainNotAllowed(_) => "chain_not_allowed",
            Self::MultiEndpointFailure { .. } => "multi_endpoint_failure",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::DependencyUnresolved { .. } => "dependency_unresolved",
            Self::Deploy { .. } => "deploy_error",
            Self::Store(_) => "store_error",
            Self::LeaseHeld(_) => "lease_held",
            Self::Plan(_) => "plan_error",
            Self::Chain(_) => "chain_error",
        }
    }

    pub(crate) fn deploy(artifact: &str, source: DeployError) -> Self {
        Self::Deploy {
            artifact: artifact.to_string(),
            source,
        }
    }
}

impl From<StoreError> for ProvisionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LeaseHeld { .. } | StoreError::LeaseLost { .. } => Self::LeaseHeld(e),
            e => Self::Store(e),
        }
    }
}

/// A deployment run that ended in `Failed`.
///
/// `deployed` lists every contract that made it on-chain before the failure.
/// Those transactions cannot be undone, so callers must surface them.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DeploymentFailure {
    pub error: ProvisionError,
    pub deployed: Vec<DeploymentResult>,
}

impl DeploymentFailure {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl From<ProvisionError> for DeploymentFailure {
    fn from(error: ProvisionError) -> Self {
        Self {
            error,
            deployed: Vec::new(),
        }
    }
}
