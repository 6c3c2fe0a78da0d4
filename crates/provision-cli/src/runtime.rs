use std::{path::Path, sync::Arc};

use provision_chain::{EthersConnector, PlanSource};
use provision_config::{Secrets, Settings};
use provision_rpc::{
    operation::Operation,
    router::OperationRouter,
    rpc_client::RpcClient,
    RpcConfig,
};
use provision_store::DeploymentStore;
use serde_json::Value;
use tracing::{debug, info};

use crate::{command::TargetArgs, error::Error};

/// Builds the router a server, or an in-process command, runs with.
/// Secrets are read from the environment here and nowhere else.
pub async fn build_router(settings_path: Option<&Path>) -> Result<OperationRouter, Error> {
    let settings = Settings::load(settings_path).await?;
    let secrets = Secrets::from_env(&settings);

    let store_path = settings.store.resolved_path();
    info!(path = %store_path.display(), "opening deployment store");
    let store = DeploymentStore::open(&store_path)?;

    let connector = Arc::new(EthersConnector::new(settings.timeouts.poll_interval()));
    let plan = PlanSource::Artifacts(settings.artifacts.clone());

    Ok(OperationRouter::new(
        Arc::new(settings),
        Arc::new(secrets),
        store,
        connector,
        plan,
    ))
}

/// Runs `operation` against a server when `target.rpc` is set, else in-process.
pub async fn execute(
    operation: Operation,
    target: TargetArgs,
    settings_path: Option<&Path>,
) -> Result<Value, Error> {
    match target.rpc {
        Some(connection) => {
            debug!(%connection, operation = operation.name(), "sending to server");
            let client = RpcClient::from_config(RpcConfig { connection }).await?;
            let response = match operation {
                Operation::Deploy(params) => client.deploy(params).await?,
                Operation::GetAddresses(p) => client.get_addresses(p.chain).await?,
                Operation::GetStatus => client.get_status().await?,
                Operation::Verify(p) => client.verify(p.chain).await?,
                Operation::Diagnose(p) => client.diagnose(p.chain).await?,
                Operation::HealthCheck => client.health_check().await?,
            };
            Ok(response)
        }
        None => Ok(build_router(settings_path).await?.dispatch(operation).await),
    }
}

/// Sends a raw operation body.
pub async fn execute_raw(
    body: &str,
    target: TargetArgs,
    settings_path: Option<&Path>,
) -> Result<Value, Error> {
    let body: Value = serde_json::from_str(body)?;
    match target.rpc {
        Some(connection) => {
            let client = RpcClient::from_config(RpcConfig { connection }).await?;
            Ok(client.dispatch(body).await?)
        }
        None => Ok(build_router(settings_path).await?.dispatch_json(body).await),
    }
}
