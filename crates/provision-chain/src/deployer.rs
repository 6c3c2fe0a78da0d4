use std::{collections::BTreeMap, sync::Arc, time::Duration};

use ethers::{
    signers::LocalWallet,
    types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest, U256},
};
use provision_common::types::{ChainName, DeploymentResult};
use tracing::{debug, info, instrument, warn};

use crate::{
    account::DeployerAccount,
    artifact::ContractArtifact,
    client::ChainClient,
    error::{DeployError, ProvisionError},
};

/// State shared by the contract deployments of one run: the bound client,
/// the signer, the next nonce and the addresses produced so far.
///
/// Deploying takes `&mut DeploymentSession`, so two transactions of the same
/// run can never be in flight at once.
pub struct DeploymentSession {
    chain: ChainName,
    chain_id: u64,
    deployer: Address,
    signer: LocalWallet,
    client: Arc<dyn ChainClient>,
    next_nonce: U256,
    addresses: BTreeMap<String, Address>,
    results: Vec<DeploymentResult>,
}

impl DeploymentSession {
    pub fn new(
        chain: ChainName,
        chain_id: u64,
        account: &DeployerAccount,
        client: Arc<dyn ChainClient>,
        next_nonce: U256,
    ) -> Self {
        Self {
            chain,
            chain_id,
            deployer: account.address(),
            signer: account.signer(chain_id),
            client,
            next_nonce,
            addresses: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    pub fn chain(&self) -> &ChainName {
        &self.chain
    }

    pub fn next_nonce(&self) -> U256 {
        self.next_nonce
    }

    pub fn addresses(&self) -> &BTreeMap<String, Address> {
        &self.addresses
    }

    pub fn results(&self) -> &[DeploymentResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<DeploymentResult> {
        self.results
    }
}

#[derive(Debug, Clone)]
pub struct ContractDeployer {
    gas_buffer_percent: u64,
    confirmation_timeout: Duration,
}

impl ContractDeployer {
    pub fn new(gas_buffer_percent: u64, confirmation_timeout: Duration) -> Self {
        Self {
            gas_buffer_percent,
            confirmation_timeout,
        }
    }

    pub fn buffered_gas(&self, estimate: U256) -> U256 {
        estimate.saturating_mul(U256::from(100 + self.gas_buffer_percent)) / 100
    }

    /// Submits the creation transaction for `artifact` and waits for one
    /// confirmation. On success the address is added to the session.
    #[instrument(skip_all, fields(chain = %session.chain, artifact = %artifact.name))]
    pub async fn deploy(
        &self,
        artifact: &ContractArtifact,
        session: &mut DeploymentSession,
    ) -> Result<DeploymentResult, ProvisionError> {
        let fail = |e: DeployError| ProvisionError::deploy(&artifact.name, e);

        let data = artifact.creation_data(&session.addresses)?;

        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(session.deployer)
            .data(data)
            .nonce(session.next_nonce)
            .chain_id(session.chain_id)
            .into();

        let estimate = session
            .client
            .estimate_gas(&tx)
            .await
            .map_err(|e| fail(DeployError::Estimate(e.to_string())))?;
        let gas = self.buffered_gas(estimate);
        let gas_price = session
            .client
            .gas_price()
            .await
            .map_err(|e| fail(DeployError::Estimate(e.to_string())))?;
        tx.set_gas(gas);
        tx.set_gas_price(gas_price);

        debug!(
            nonce = %session.next_nonce,
            %estimate,
            %gas,
            %gas_price,
            "submitting creation transaction"
        );

        let tx_hash = session
            .client
            .send_transaction(tx, &session.signer)
            .await
            .map_err(|e| fail(DeployError::Submit(e.to_string())))?;
        // the node accepted it, so this nonce is spent whatever happens next
        session.next_nonce += U256::one();

        let confirmation = session.client.wait_for_inclusion(tx_hash);
        let inclusion = match tokio::time::timeout(self.confirmation_timeout, confirmation).await {
            Err(_) => {
                warn!(?tx_hash, "no confirmation before deadline");
                return Err(fail(DeployError::ConfirmationTimeout {
                    tx_hash,
                    secs: self.confirmation_timeout.as_secs(),
                }));
            }
            Ok(Err(e)) => {
                return Err(fail(DeployError::Receipt {
                    tx_hash,
                    reason: e.to_string(),
                }))
            }
            Ok(Ok(None)) => return Err(fail(DeployError::Dropped { tx_hash })),
            Ok(Ok(Some(inclusion))) => inclusion,
        };

        if !inclusion.succeeded {
            return Err(fail(DeployError::Reverted { tx_hash }));
        }
        let address = inclusion
            .contract_address
            .ok_or_else(|| fail(DeployError::MissingAddress { tx_hash }))?;

        let result = DeploymentResult {
            name: artifact.name.clone(),
            address,
            transaction_hash: tx_hash,
            gas_used: inclusion.gas_used.unwrap_or_default(),
            block_number: inclusion.block_number.unwrap_or_default(),
        };
        info!(
            ?address,
            ?tx_hash,
            gas_used = %result.gas_used,
            block = result.block_number,
            "contract deployed"
        );

        session.addresses.insert(result.name.clone(), address);
        session.results.push(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use provision_common::types::{EndpointSource, RpcEndpoint};
    use provision_config::Secret;
    use url::Url;

    use super::*;
    use crate::{
        client::{Connector, DeadlineClient},
        testing::{standard_plan, MockBehavior, MockConnector, DEV_KEY},
    };

    async fn session(connector: &MockConnector, nonce: u64) -> DeploymentSession {
        let endpoint = RpcEndpoint::new(
            Url::parse("http://127.0.0.1:8545").unwrap(),
            EndpointSource::Public,
            0,
        );
        let client = DeadlineClient::wrap(
            connector.connect(&endpoint).await.unwrap(),
            Duration::from_secs(10),
        );
        let account = DeployerAccount::from_secret(Some(&Secret::new(DEV_KEY)), "KEY").unwrap();
        DeploymentSession::new("localhost".into(), 31337, &account, client, U256::from(nonce))
    }

    fn deployer() -> ContractDeployer {
        ContractDeployer::new(20, Duration::from_secs(30))
    }

    #[test]
    fn gas_buffer_is_applied() {
        assert_eq!(deployer().buffered_gas(U256::from(100_000)), U256::from(120_000));
        assert_eq!(
            ContractDeployer::new(0, Duration::ZERO).buffered_gas(U256::from(21_000)),
            U256::from(21_000)
        );
    }

    #[tokio::test]
    async fn deploys_in_order_with_consecutive_nonces() {
        let connector = MockConnector::new(MockBehavior::Healthy { block: 1000 })
            .with_nonce(7)
            .with_gas_estimate(500_000);
        let mut session = session(&connector, 7).await;
        let plan = standard_plan();

        for artifact in plan.independents().chain(plan.dependents()) {
            deployer().deploy(artifact, &mut session).await.unwrap();
        }

        let submitted = connector.submitted();
        let nonces: Vec<_> = submitted.iter().map(|tx| tx.nonce.as_u64()).collect();
        assert_eq!(nonces, vec![7, 8, 9, 10]);
        assert!(submitted.iter().all(|tx| tx.gas == Some(U256::from(600_000))));
        assert_eq!(session.next_nonce(), U256::from(11));
        assert_eq!(session.addresses().len(), 4);

        // the pool's constructor carries the token addresses
        let pool_data = &submitted[3].data;
        for token in &session.results()[..3] {
            assert!(pool_data
                .windows(20)
                .any(|w| w == token.address.as_bytes()));
        }
    }

    #[tokio::test]
    async fn reverted_creation_is_an_error() {
        let connector =
            MockConnector::new(MockBehavior::Healthy { block: 1 }).revert_submission(0);
        let mut session = session(&connector, 0).await;
        let plan = standard_plan();
        let token = plan.independents().next().unwrap();

        let err = deployer().deploy(token, &mut session).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Deploy {
                source: DeployError::Reverted { .. },
                ..
            }
        ));
        assert!(session.addresses().is_empty());
        // mined, so the nonce is consumed
        assert_eq!(session.next_nonce(), U256::one());
    }

    #[tokio::test]
    async fn rejected_submission_keeps_nonce() {
        let connector =
            MockConnector::new(MockBehavior::Healthy { block: 1 }).reject_submission(0);
        let mut session = session(&connector, 0).await;
        let plan = standard_plan();
        let token = plan.independents().next().unwrap();

        let err = deployer().deploy(token, &mut session).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Deploy {
                source: DeployError::Submit(_),
                ..
            }
        ));
        assert_eq!(session.next_nonce(), U256::zero());
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_deadline() {
        let connector = MockConnector::new(MockBehavior::Healthy { block: 1 }).stall_receipts();
        let mut session = session(&connector, 0).await;
        let plan = standard_plan();
        let token = plan.independents().next().unwrap();

        let err = deployer().deploy(token, &mut session).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Deploy {
                source: DeployError::ConfirmationTimeout { secs: 30, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unresolved_dependency_submits_nothing() {
        let connector = MockConnector::new(MockBehavior::Healthy { block: 1 });
        let mut session = session(&connector, 0).await;
        let plan = standard_plan();
        let pool = plan.dependents().next().unwrap();

        let err = deployer().deploy(pool, &mut session).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DependencyUnresolved { .. }));
        assert!(connector.submitted().is_empty());
        assert_eq!(connector.gas_estimates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_estimate_is_bounded() {
        let connector =
            MockConnector::new(MockBehavior::Healthy { block: 1 }).stall_call("estimate_gas");
        let mut session = session(&connector, 0).await;
        let plan = standard_plan();
        let token = plan.independents().next().unwrap();

        let err = deployer().deploy(token, &mut session).await.unwrap_err();
        match err {
            ProvisionError::Deploy {
                source: DeployError::Estimate(reason),
                ..
            } => assert!(reason.contains("within 10s"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(connector.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_broadcast_keeps_nonce() {
        let connector =
            MockConnector::new(MockBehavior::Healthy { block: 1 }).stall_call("send_transaction");
        let mut session = session(&connector, 3).await;
        let plan = standard_plan();
        let token = plan.independents().next().unwrap();

        let err = deployer().deploy(token, &mut session).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Deploy {
                source: DeployError::Submit(_),
                ..
            }
        ));
        assert_eq!(session.next_nonce(), U256::from(3));
    }
}
