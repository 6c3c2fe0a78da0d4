use jsonrpsee::{
    async_client::{Client, ClientBuilder},
    client_transport::ws::WsTransportClientBuilder,
};
use provision_common::types::ChainName;
use serde_json::Value;
use tracing::error;

use crate::{operation::DeployParams, ProvisionApiClient, RpcConfig};

#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    #[error("RPC client error: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    #[error("RPC client handshake error: {0}")]
    RpcHandshake(#[from] jsonrpsee::client_transport::ws::WsHandshakeError),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
}

pub struct RpcClient {
    /// JSON-RPC websocket client.
    pub client: Client,

    /// RPC Configuration
    pub config: RpcConfig,
}

impl RpcClient {
    pub async fn from_config(config: RpcConfig) -> Result<Self, RpcClientError> {
        let (tx, rx) = WsTransportClientBuilder::default()
            .build(config.connection.to_url()?)
            .await
            .inspect_err(|_| error!("failed to connect to RPC server: {}", config.connection))?;

        Ok(Self {
            client: ClientBuilder::default().build_with_tokio(tx, rx),
            config,
        })
    }

    pub async fn deploy(&self, params: DeployParams) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::deploy(&self.client, params).await?)
    }

    pub async fn get_addresses(&self, chain: ChainName) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::get_addresses(&self.client, chain).await?)
    }

    pub async fn get_status(&self) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::get_status(&self.client).await?)
    }

    pub async fn verify(&self, chain: ChainName) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::verify(&self.client, chain).await?)
    }

    pub async fn diagnose(&self, chain: ChainName) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::diagnose(&self.client, chain).await?)
    }

    pub async fn health_check(&self) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::health_check(&self.client).await?)
    }

    pub async fn dispatch(&self, body: Value) -> Result<Value, RpcClientError> {
        Ok(ProvisionApiClient::dispatch(&self.client, body).await?)
    }
}
