use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::LocalWallet,
    types::{
        transaction::eip2718::TypedTransaction,
        Address,
        BlockNumber,
        TransactionReceipt,
        H256,
        U256,
    },
};
use provision_common::types::RpcEndpoint;
use tracing::trace;

use crate::error::ChainError;

/// What a receipt says about a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub tx_hash: H256,
    pub contract_address: Option<Address>,
    pub gas_used: Option<U256>,
    pub block_number: Option<u64>,
    pub succeeded: bool,
}

impl From<TransactionReceipt> for Inclusion {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            // receipts without status predate byzantium and did not revert
            succeeded: receipt.status.map_or(true, |s| s.as_u64() == 1),
        }
    }
}

/// The node operations deployment and diagnostics need.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn endpoint(&self) -> &RpcEndpoint;

    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Transaction count including pending transactions, i.e. the next nonce.
    async fn pending_nonce(&self, address: Address) -> Result<U256, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError>;

    /// Signs `tx` with `signer` and broadcasts it.
    async fn send_transaction(
        &self,
        tx: TypedTransaction,
        signer: &LocalWallet,
    ) -> Result<H256, ChainError>;

    /// Resolves once the transaction has one confirmation. `None` means the
    /// node no longer knows the transaction.
    async fn wait_for_inclusion(&self, tx_hash: H256) -> Result<Option<Inclusion>, ChainError>;
}

/// Builds a [`ChainClient`] for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn ChainClient>, ChainError>;
}

/// Bounds every request of an inner client by `limit`, except
/// [`ChainClient::wait_for_inclusion`], whose deadline is the caller's
/// confirmation timeout.
pub struct DeadlineClient {
    inner: Arc<dyn ChainClient>,
    limit: Duration,
}

impl DeadlineClient {
    pub fn wrap(inner: Arc<dyn ChainClient>, limit: Duration) -> Arc<dyn ChainClient> {
        Arc::new(Self { inner, limit })
    }

    async fn bounded<T, F>(&self, call: &'static str, request: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>> + Send,
    {
        tokio::time::timeout(self.limit, request)
            .await
            .map_err(|_| {
                ChainError::Timeout {
                    call,
                    endpoint: self.inner.endpoint().label.clone(),
                    secs: self.limit.as_secs(),
                }
            })?
    }
}

#[async_trait]
impl ChainClient for DeadlineClient {
    fn endpoint(&self) -> &RpcEndpoint {
        self.inner.endpoint()
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.bounded("eth_blockNumber", self.inner.block_number()).await
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.bounded("eth_chainId", self.inner.chain_id()).await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.bounded("eth_getBalance", self.inner.balance(address)).await
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256, ChainError> {
        self.bounded("eth_getTransactionCount", self.inner.pending_nonce(address))
            .await
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.bounded("eth_gasPrice", self.inner.gas_price()).await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError> {
        self.bounded("eth_estimateGas", self.inner.estimate_gas(tx)).await
    }

    async fn send_transaction(
        &self,
        tx: TypedTransaction,
        signer: &LocalWallet,
    ) -> Result<H256, ChainError> {
        self.bounded("eth_sendRawTransaction", self.inner.send_transaction(tx, signer))
            .await
    }

    async fn wait_for_inclusion(&self, tx_hash: H256) -> Result<Option<Inclusion>, ChainError> {
        self.inner.wait_for_inclusion(tx_hash).await
    }
}

/// HTTP JSON-RPC connector.
#[derive(Debug, Clone)]
pub struct EthersConnector {
    poll_interval: Duration,
}

impl EthersConnector {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl Connector for EthersConnector {
    async fn connect(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn ChainClient>, ChainError> {
        let provider = Provider::<Http>::try_from(endpoint.url.as_str())
            .map_err(|e| {
                ChainError::Connect {
                    endpoint: endpoint.label.clone(),
                    reason: e.to_string(),
                }
            })?
            .interval(self.poll_interval);

        Ok(Arc::new(EthersClient {
            endpoint: endpoint.clone(),
            provider,
            poll_interval: self.poll_interval,
        }))
    }
}

pub struct EthersClient {
    endpoint: RpcEndpoint,
    provider: Provider<Http>,
    poll_interval: Duration,
}

impl EthersClient {
    /// Transport errors quote the request URL, which may carry an API key.
    fn scrub(&self, e: impl Display) -> ChainError {
        ChainError::Rpc(
            e.to_string()
                .replace(self.endpoint.url.as_str(), &self.endpoint.label),
        )
    }
}

#[async_trait]
impl ChainClient for EthersClient {
    fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| self.scrub(e))?;
        Ok(block.as_u64())
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| self.scrub(e))?;
        Ok(id.as_u64())
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| self.scrub(e))
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.scrub(e))
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| self.scrub(e))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(|e| self.scrub(e))
    }

    async fn send_transaction(
        &self,
        tx: TypedTransaction,
        signer: &LocalWallet,
    ) -> Result<H256, ChainError> {
        let client = SignerMiddleware::new(self.provider.clone(), signer.clone());
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| self.scrub(e))?;
        let tx_hash = pending.tx_hash();
        trace!(endpoint = %self.endpoint, ?tx_hash, "transaction broadcast");
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(&self, tx_hash: H256) -> Result<Option<Inclusion>, ChainError> {
        let receipt = PendingTransaction::new(tx_hash, &self.provider)
            .interval(self.poll_interval)
            .confirmations(1)
            .await
            .map_err(|e| self.scrub(e))?;
        Ok(receipt.map(Inclusion::from))
    }
}
