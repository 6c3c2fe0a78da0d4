use std::collections::BTreeMap;

use ethers::types::{Address, H256, U256};
use provision_chain::{DeploymentFailure, DeploymentOutcome, DiagnosticReport, ProvisionError};
use provision_common::{
    serialization::encoding::u256_decimal,
    types::{ChainName, ContractAddress, DeploymentSummary},
};
use serde::Serialize;
use serde_json::{json, Value};

/// Encodes a response, degrading to a failure body if encoding itself fails.
pub fn to_value<T: Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        json!({
            "success": false,
            "error": format!("failed to encode response: {e}"),
            "kind": "internal",
        })
    })
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub success: bool,
    pub chain: ChainName,
    pub contracts: BTreeMap<String, Address>,
    pub transactions: BTreeMap<String, H256>,
    pub deployer: Address,
    #[serde(with = "u256_decimal")]
    pub gas_used: U256,
    pub block_number: u64,
    pub network_id: u64,
    /// Redacted label of the endpoint that was used.
    pub endpoint: String,
}

impl From<&DeploymentOutcome> for DeployResponse {
    fn from(outcome: &DeploymentOutcome) -> Self {
        let record = &outcome.record;
        Self {
            success: true,
            chain: record.chain.clone(),
            contracts: record.contract_addresses.clone(),
            transactions: outcome
                .results
                .iter()
                .map(|r| (r.name.clone(), r.transaction_hash))
                .collect(),
            deployer: record.deployer_address,
            gas_used: record.metadata.gas_used_total,
            block_number: record.metadata.block_number,
            network_id: record.metadata.network_id,
            endpoint: outcome.endpoint.label.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
    pub kind: String,
    /// Contracts already on-chain when a deployment failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<BTreeMap<String, Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl FailureResponse {
    pub fn new(kind: impl Into<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            kind: kind.into(),
            partial: None,
            details: None,
        }
    }

    pub fn from_error(error: &ProvisionError) -> Self {
        let details = match error {
            ProvisionError::MultiEndpointFailure { failures, .. } => {
                Some(json!({ "failures": failures }))
            }
            ProvisionError::InsufficientBalance {
                deployer,
                balance,
                required,
                ..
            } => {
                Some(json!({
                    "deployer": deployer,
                    "balance": balance.to_string(),
                    "required": required.to_string(),
                }))
            }
            _ => None,
        };

        Self {
            details,
            ..Self::new(error.kind(), error)
        }
    }

    pub fn from_failure(failure: &DeploymentFailure) -> Self {
        let partial = (!failure.deployed.is_empty()).then(|| {
            failure
                .deployed
                .iter()
                .map(|r| (r.name.clone(), r.address))
                .collect()
        });

        Self {
            partial,
            ..Self::from_error(&failure.error)
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AddressesResponse {
    pub success: bool,
    pub chain: ChainName,
    pub addresses: Vec<ContractAddress>,
    pub verified: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub deployments: Vec<DeploymentSummary>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub chain: ChainName,
    pub verified: bool,
    /// False when the record was already verified.
    pub changed: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: DiagnosticReport,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub secrets_configured: BTreeMap<String, bool>,
}
