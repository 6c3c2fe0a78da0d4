pub mod account;
pub mod artifact;
pub mod client;
pub mod deployer;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod selector;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::{
    account::DeployerAccount,
    artifact::{ArtifactLoader, ConstructorArg, ContractArtifact, DeploymentPlan, PlanError},
    client::{ChainClient, Connector, EthersConnector},
    deployer::{ContractDeployer, DeploymentSession},
    diagnostics::{DiagnosticReport, Diagnostics},
    endpoint::EndpointPool,
    error::{ChainError, DeployError, DeploymentFailure, EndpointFailure, ProvisionError},
    orchestrator::{
        DeploymentOrchestrator,
        DeploymentOutcome,
        DeploymentRequest,
        PlanSource,
        RunState,
    },
    probe::{EndpointProbe, ProbeOutcome},
    selector::{BoundClient, ProviderSelector},
};
