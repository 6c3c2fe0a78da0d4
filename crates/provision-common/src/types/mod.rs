pub mod chain;
pub mod deployment;
pub mod endpoint;
pub mod network;

pub use chain::ChainName;
pub use deployment::{
    ContractAddress,
    DeploymentMetadata,
    DeploymentRecord,
    DeploymentResult,
    DeploymentSummary,
};
pub use endpoint::{redact_url, EndpointSource, RpcEndpoint};
