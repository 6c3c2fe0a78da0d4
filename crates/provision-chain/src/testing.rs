//! In-memory [`Connector`] that simulates a set of RPC endpoints sharing one
//! chain state. Used by this crate's tests and, behind the `testing` feature,
//! by crates that build on the orchestrator.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, H256, U256},
    utils::{get_contract_address, parse_ether},
};
use provision_common::types::RpcEndpoint;

use crate::{
    artifact::{ContractArtifact, DeploymentPlan, PlanFile, POOL},
    client::{ChainClient, Connector, Inclusion},
    error::ChainError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Answers every call; the head starts at `block`.
    Healthy { block: u64 },
    /// Every call fails with this message.
    Down(String),
    /// Every call hangs forever.
    Hang,
    /// `connect` itself fails.
    Unconnectable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub endpoint: String,
    pub from: Address,
    pub nonce: U256,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
    pub data: Bytes,
}

#[derive(Debug)]
struct MockChain {
    chain_id: u64,
    balance: U256,
    next_nonce: U256,
    gas_estimate: U256,
    mined: u64,
    estimates: usize,
    attempts: usize,
    probed: Vec<String>,
    submitted: Vec<SubmittedTx>,
    receipts: HashMap<H256, Inclusion>,
    revert: HashSet<usize>,
    reject: HashSet<usize>,
    stall_receipts: bool,
    stalled: HashSet<&'static str>,
}

/// Runs after the node accepted a transaction, with its submission index.
pub type SubmissionHook = Arc<dyn Fn(usize) + Send + Sync>;

pub struct MockConnector {
    default: MockBehavior,
    behaviors: HashMap<String, MockBehavior>,
    chain: Arc<Mutex<MockChain>>,
    on_submission: Option<SubmissionHook>,
}

impl MockConnector {
    pub fn new(default: MockBehavior) -> Self {
        Self {
            default,
            behaviors: HashMap::new(),
            chain: Arc::new(Mutex::new(MockChain {
                chain_id: 31337,
                balance: parse_ether(10).unwrap_or_default(),
                next_nonce: U256::zero(),
                gas_estimate: U256::from(1_000_000),
                mined: 0,
                estimates: 0,
                attempts: 0,
                probed: Vec::new(),
                submitted: Vec::new(),
                receipts: HashMap::new(),
                revert: HashSet::new(),
                reject: HashSet::new(),
                stall_receipts: false,
                stalled: HashSet::new(),
            })),
            on_submission: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockChain> {
        lock(&self.chain)
    }

    /// Overrides the behavior for one URL.
    pub fn with_endpoint(mut self, url: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(normalize(url), behavior);
        self
    }

    pub fn with_balance(self, balance: U256) -> Self {
        self.state().balance = balance;
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.state().next_nonce = U256::from(nonce);
        self
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.state().chain_id = chain_id;
        self
    }

    pub fn with_gas_estimate(self, gas: u64) -> Self {
        self.state().gas_estimate = U256::from(gas);
        self
    }

    /// The `index`-th accepted transaction is mined with status 0.
    pub fn revert_submission(self, index: usize) -> Self {
        self.state().revert.insert(index);
        self
    }

    /// The `index`-th broadcast attempt is rejected by the node.
    pub fn reject_submission(self, index: usize) -> Self {
        self.state().reject.insert(index);
        self
    }

    /// Transactions are accepted but never mined.
    pub fn stall_receipts(self) -> Self {
        self.state().stall_receipts = true;
        self
    }

    /// `call` (a [`ChainClient`] method name) never answers on any endpoint,
    /// while the head block keeps answering.
    pub fn stall_call(self, call: &'static str) -> Self {
        self.state().stalled.insert(call);
        self
    }

    pub fn on_submission(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_submission = Some(Arc::new(hook));
        self
    }

    /// URLs whose head block was queried, in call order.
    pub fn probed(&self) -> Vec<String> {
        self.state().probed.clone()
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.state().submitted.clone()
    }

    pub fn gas_estimates(&self) -> usize {
        self.state().estimates
    }
}

fn lock(chain: &Mutex<MockChain>) -> MutexGuard<'_, MockChain> {
    chain.lock().unwrap_or_else(|e| e.into_inner())
}

fn normalize(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn ChainClient>, ChainError> {
        let behavior = self
            .behaviors
            .get(endpoint.url.as_str())
            .unwrap_or(&self.default)
            .clone();
        if behavior == MockBehavior::Unconnectable {
            return Err(ChainError::Connect {
                endpoint: endpoint.label.clone(),
                reason: "unsupported transport".into(),
            });
        }
        Ok(Arc::new(MockClient {
            endpoint: endpoint.clone(),
            behavior,
            chain: self.chain.clone(),
            on_submission: self.on_submission.clone(),
        }))
    }
}

struct MockClient {
    endpoint: RpcEndpoint,
    behavior: MockBehavior,
    chain: Arc<Mutex<MockChain>>,
    on_submission: Option<SubmissionHook>,
}

impl MockClient {
    /// Fails or hangs unless the endpoint is healthy; returns its base block.
    async fn check(&self, call: &'static str) -> Result<u64, ChainError> {
        let stalled = lock(&self.chain).stalled.contains(call);
        if stalled {
            return std::future::pending().await;
        }
        match &self.behavior {
            MockBehavior::Healthy { block } => Ok(*block),
            MockBehavior::Down(message) => Err(ChainError::Rpc(message.clone())),
            MockBehavior::Hang | MockBehavior::Unconnectable => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ChainClient for MockClient {
    fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        lock(&self.chain).probed.push(self.endpoint.url.to_string());
        let block = self.check("block_number").await?;
        Ok(block + lock(&self.chain).mined)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.check("chain_id").await?;
        Ok(lock(&self.chain).chain_id)
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        self.check("balance").await?;
        Ok(lock(&self.chain).balance)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<U256, ChainError> {
        self.check("pending_nonce").await?;
        Ok(lock(&self.chain).next_nonce)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.check("gas_price").await?;
        Ok(U256::exp10(9))
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256, ChainError> {
        self.check("estimate_gas").await?;
        let mut chain = lock(&self.chain);
        chain.estimates += 1;
        Ok(chain.gas_estimate)
    }

    async fn send_transaction(
        &self,
        tx: TypedTransaction,
        signer: &LocalWallet,
    ) -> Result<H256, ChainError> {
        let block = self.check("send_transaction").await?;
        let (tx_hash, index) = self.accept(tx, signer, block)?;
        if let Some(hook) = &self.on_submission {
            hook(index);
        }
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(&self, tx_hash: H256) -> Result<Option<Inclusion>, ChainError> {
        self.check("wait_for_inclusion").await?;
        let (stall, inclusion) = {
            let chain = lock(&self.chain);
            (chain.stall_receipts, chain.receipts.get(&tx_hash).cloned())
        };
        if stall {
            return std::future::pending().await;
        }
        Ok(inclusion)
    }
}

impl MockClient {
    /// Records `tx` as mined unless the node is set to reject this attempt.
    fn accept(
        &self,
        tx: TypedTransaction,
        signer: &LocalWallet,
        block: u64,
    ) -> Result<(H256, usize), ChainError> {
        let mut chain = lock(&self.chain);

        let attempt = chain.attempts;
        chain.attempts += 1;
        if chain.reject.contains(&attempt) {
            return Err(ChainError::Rpc("insufficient funds for gas * price + value".into()));
        }

        let nonce = tx.nonce().copied().unwrap_or(chain.next_nonce);
        if nonce != chain.next_nonce {
            return Err(ChainError::Rpc(format!(
                "nonce mismatch: expected {}, got {nonce}",
                chain.next_nonce
            )));
        }

        let from = signer.address();
        let index = chain.submitted.len();
        chain.submitted.push(SubmittedTx {
            endpoint: self.endpoint.url.to_string(),
            from,
            nonce,
            gas: tx.gas().copied(),
            gas_price: tx.gas_price(),
            data: tx.data().cloned().unwrap_or_default(),
        });
        chain.next_nonce = nonce + 1;
        chain.mined += 1;

        let tx_hash = H256::from_low_u64_be(index as u64 + 1);
        let gas_used = chain.gas_estimate;
        let inclusion = Inclusion {
            tx_hash,
            contract_address: Some(get_contract_address(from, nonce)),
            gas_used: Some(gas_used),
            block_number: Some(block + chain.mined),
            succeeded: !chain.revert.contains(&index),
        };
        chain.receipts.insert(tx_hash, inclusion);
        Ok((tx_hash, index))
    }
}

/// Well-known development key (anvil/hardhat account 0). Never holds real funds.
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Constructor ABI of the pool: three token addresses.
pub fn pool_abi() -> serde_json::Value {
    serde_json::json!([{
        "type": "constructor",
        "stateMutability": "nonpayable",
        "inputs": [
            {"name": "usdc", "type": "address", "internalType": "address"},
            {"name": "usdt", "type": "address", "internalType": "address"},
            {"name": "dai", "type": "address", "internalType": "address"}
        ]
    }])
}

/// The standard plan with tiny placeholder bytecode.
pub fn standard_plan() -> DeploymentPlan {
    let artifacts = PlanFile::standard()
        .contracts
        .into_iter()
        .map(|entry| {
            let abi = if entry.name == POOL {
                pool_abi()
            } else {
                serde_json::json!([])
            };
            ContractArtifact::from_json(
                &entry.name,
                &serde_json::json!({"abi": abi, "bytecode": "0x6080604052"}),
                entry.constructor_args,
            )
            .expect("placeholder artifact is valid")
        })
        .collect();
    DeploymentPlan::new(artifacts).expect("standard plan is acyclic")
}
