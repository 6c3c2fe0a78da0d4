use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::{serialization::encoding::u256_decimal, types::ChainName};

/// Outcome of one contract-creation transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub name: String,
    pub address: Address,
    pub transaction_hash: H256,
    #[serde(with = "u256_decimal")]
    pub gas_used: U256,
    pub block_number: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMetadata {
    /// Highest inclusion block among the deployment transactions.
    pub block_number: u64,
    /// Numeric chain id reported by the endpoint that was used.
    pub network_id: u64,
    #[serde(with = "u256_decimal")]
    pub gas_used_total: U256,
}

/// The persisted result of a complete deployment run on one chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub chain: ChainName,
    pub contract_addresses: BTreeMap<String, Address>,
    pub deployer_address: Address,
    pub deployed_at: DateTime<Utc>,
    pub verified: bool,
    pub metadata: DeploymentMetadata,
}

impl DeploymentRecord {
    /// Aggregates per-contract results into an unverified record.
    pub fn from_results(
        chain: ChainName,
        deployer_address: Address,
        network_id: u64,
        results: &[DeploymentResult],
    ) -> Self {
        let contract_addresses = results
            .iter()
            .map(|r| (r.name.clone(), r.address))
            .collect();
        let gas_used_total = results
            .iter()
            .fold(U256::zero(), |acc, r| acc.saturating_add(r.gas_used));
        let block_number = results.iter().map(|r| r.block_number).max().unwrap_or(0);

        Self {
            chain,
            contract_addresses,
            deployer_address,
            deployed_at: Utc::now(),
            verified: false,
            metadata: DeploymentMetadata {
                block_number,
                network_id,
                gas_used_total,
            },
        }
    }

    pub fn summary(&self) -> DeploymentSummary {
        DeploymentSummary {
            chain: self.chain.clone(),
            verified: self.verified,
            deployed_at: self.deployed_at,
        }
    }

    pub fn addresses(&self) -> Vec<ContractAddress> {
        self.contract_addresses
            .iter()
            .map(|(name, address)| {
                ContractAddress {
                    name: name.clone(),
                    address: *address,
                }
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub chain: ChainName,
    pub verified: bool,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddress {
    pub name: String,
    pub address: Address,
}
