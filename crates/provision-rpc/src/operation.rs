use provision_chain::DeploymentRequest;
use provision_common::types::ChainName;
use serde::{Deserialize, Serialize};

/// Body fields that would carry a signing key. Requests naming any of them
/// are refused before parsing; the key is only ever read from the environment.
pub const FORBIDDEN_FIELDS: &[&str] = &[
    "privateKey",
    "private_key",
    "deployerPrivateKey",
    "deployer_private_key",
    "signingKey",
    "signing_key",
    "mnemonic",
];

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployParams {
    pub chain: ChainName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_rpcs: Vec<String>,
}

impl From<DeployParams> for DeploymentRequest {
    fn from(params: DeployParams) -> Self {
        Self {
            chain: params.chain,
            rpc_url: params.rpc_url.filter(|url| !url.trim().is_empty()),
            fallback_rpcs: params.fallback_rpcs,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub chain: ChainName,
}

/// One request to the service, tagged by `operation`:
///
/// ```json
/// {"operation": "deploy", "chain": "sepolia", "rpcUrl": "https://..."}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Deploy(DeployParams),
    GetAddresses(ChainParams),
    GetStatus,
    Verify(ChainParams),
    Diagnose(ChainParams),
    HealthCheck,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy(_) => "deploy",
            Self::GetAddresses(_) => "get_addresses",
            Self::GetStatus => "get_status",
            Self::Verify(_) => "verify",
            Self::Diagnose(_) => "diagnose",
            Self::HealthCheck => "health_check",
        }
    }

    /// The chain the operation targets, if any.
    pub fn chain(&self) -> Option<&ChainName> {
        match self {
            Self::Deploy(p) => Some(&p.chain),
            Self::GetAddresses(p) | Self::Verify(p) | Self::Diagnose(p) => Some(&p.chain),
            Self::GetStatus | Self::HealthCheck => None,
        }
    }
}
