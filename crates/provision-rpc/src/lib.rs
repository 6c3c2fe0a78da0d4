use clap::{self, Parser};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use provision_common::types::{network::Connection, ChainName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod metrics;
pub mod operation;
pub mod response;
pub mod router;
#[cfg(feature = "client")]
pub mod rpc_client;
#[cfg(feature = "server")]
pub mod rpc_server;

use crate::operation::DeployParams;

#[derive(Serialize, Deserialize, Parser, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    /// Connection settings for RPC
    #[arg(long, value_parser = Connection::try_from_str, default_value = "127.0.0.1:8080")]
    pub connection: Connection,
}

/// Every method answers with a JSON object carrying `success`. Domain
/// failures are part of the response, never transport errors.
#[rpc(server, client)]
pub(crate) trait ProvisionApi {
    #[method(name = "deploy")]
    async fn deploy(&self, params: DeployParams) -> RpcResult<Value>;

    #[method(name = "getAddresses")]
    async fn get_addresses(&self, chain: ChainName) -> RpcResult<Value>;

    #[method(name = "getStatus")]
    async fn get_status(&self) -> RpcResult<Value>;

    #[method(name = "verify")]
    async fn verify(&self, chain: ChainName) -> RpcResult<Value>;

    #[method(name = "diagnose")]
    async fn diagnose(&self, chain: ChainName) -> RpcResult<Value>;

    #[method(name = "healthCheck")]
    async fn health_check(&self) -> RpcResult<Value>;

    /// Raw operation body, e.g. `{"operation": "get_status"}`.
    #[method(name = "dispatch")]
    async fn dispatch(&self, body: Value) -> RpcResult<Value>;
}
