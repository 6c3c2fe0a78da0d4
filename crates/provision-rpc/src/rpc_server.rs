use std::net::SocketAddr;

use anyhow::{Context, Result};
use jsonrpsee::{
    core::{async_trait, RpcResult},
    server::{Server, ServerHandle},
};
use provision_common::types::ChainName;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    operation::{ChainParams, DeployParams, Operation},
    router::OperationRouter,
    ProvisionApiServer,
    RpcConfig,
};

#[derive(Clone)]
pub struct RpcServer {
    config: RpcConfig,
    router: OperationRouter,
}

impl RpcServer {
    pub fn new(config: RpcConfig, router: OperationRouter) -> Self {
        Self { config, router }
    }

    pub async fn spawn_and_run(&self) -> Result<ServerHandle> {
        let addr: SocketAddr = self.config.connection.into();

        let server = Server::builder()
            .set_tcp_no_delay(true)
            .build(&addr)
            .await
            .context("failed to start rpc server")?;

        info!("Starting RPC server on {}", addr);

        Ok(server.start(self.clone().into_rpc()))
    }
}

#[async_trait]
impl ProvisionApiServer for RpcServer {
    /// Example POST request:
    /// {
    ///   "method": "deploy",
    ///   "params": [{"chain": "sepolia"}],
    ///   "id": 1,
    ///   "jsonrpc": "2.0"
    /// }
    async fn deploy(&self, params: DeployParams) -> RpcResult<Value> {
        debug!(chain = %params.chain, "deploy request");
        Ok(self.router.dispatch(Operation::Deploy(params)).await)
    }

    async fn get_addresses(&self, chain: ChainName) -> RpcResult<Value> {
        Ok(self
            .router
            .dispatch(Operation::GetAddresses(ChainParams { chain }))
            .await)
    }

    async fn get_status(&self) -> RpcResult<Value> {
        Ok(self.router.dispatch(Operation::GetStatus).await)
    }

    async fn verify(&self, chain: ChainName) -> RpcResult<Value> {
        Ok(self
            .router
            .dispatch(Operation::Verify(ChainParams { chain }))
            .await)
    }

    async fn diagnose(&self, chain: ChainName) -> RpcResult<Value> {
        Ok(self
            .router
            .dispatch(Operation::Diagnose(ChainParams { chain }))
            .await)
    }

    async fn health_check(&self) -> RpcResult<Value> {
        Ok(self.router.dispatch(Operation::HealthCheck).await)
    }

    /// Example POST request:
    /// {
    ///   "method": "dispatch",
    ///   "params": [{"operation": "get_status"}],
    ///   "id": 1,
    ///   "jsonrpc": "2.0"
    /// }
    async fn dispatch(&self, body: Value) -> RpcResult<Value> {
        Ok(self.router.dispatch_json(body).await)
    }
}
