use std::sync::Arc;

use provision_common::types::{ChainName, DeploymentRecord, DeploymentResult, RpcEndpoint};
use provision_config::{settings::ArtifactSettings, Error as ConfigError, Secrets, Settings};
use provision_store::DeploymentStore;
use strum::Display;
use tracing::{error, info, instrument, warn};

use crate::{
    account::DeployerAccount,
    artifact::{ArtifactLoader, DeploymentPlan, PlanError},
    client::{Connector, DeadlineClient},
    deployer::{ContractDeployer, DeploymentSession},
    endpoint::EndpointPool,
    error::{DeploymentFailure, ProvisionError},
    probe::EndpointProbe,
    selector::ProviderSelector,
};

/// Where a run is. Any state can end in failure.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    SelectingProvider,
    CheckingBalance,
    DeployingIndependents,
    DeployingDependents,
    Persisting,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub chain: ChainName,
    pub rpc_url: Option<String>,
    pub fallback_rpcs: Vec<String>,
}

impl DeploymentRequest {
    pub fn new(chain: impl Into<ChainName>) -> Self {
        Self {
            chain: chain.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub record: DeploymentRecord,
    pub results: Vec<DeploymentResult>,
    pub endpoint: RpcEndpoint,
}

/// Where the contracts to deploy come from.
#[derive(Debug, Clone)]
pub enum PlanSource {
    Fixed(Arc<DeploymentPlan>),
    /// Loaded from disk on every run, so rebuilt artifacts are picked up.
    Artifacts(ArtifactSettings),
}

impl PlanSource {
    pub async fn load(&self) -> Result<Arc<DeploymentPlan>, PlanError> {
        match self {
            Self::Fixed(plan) => Ok(plan.clone()),
            Self::Artifacts(settings) => {
                Ok(Arc::new(ArtifactLoader::from_settings(settings).await?))
            }
        }
    }
}

/// Runs the whole deployment of a plan onto one chain.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    settings: Arc<Settings>,
    secrets: Arc<Secrets>,
    store: DeploymentStore,
    selector: ProviderSelector,
    deployer: ContractDeployer,
    plan: PlanSource,
}

impl DeploymentOrchestrator {
    pub fn new(
        settings: Arc<Settings>,
        secrets: Arc<Secrets>,
        store: DeploymentStore,
        connector: Arc<dyn Connector>,
        plan: PlanSource,
    ) -> Self {
        let probe = EndpointProbe::new(connector, settings.timeouts.probe());
        let deployer = ContractDeployer::new(
            settings.gas.buffer_percent,
            settings.timeouts.confirmation(),
        );
        Self {
            selector: ProviderSelector::new(probe),
            deployer,
            settings,
            secrets,
            store,
            plan,
        }
    }

    /// Deploys every artifact of the plan or none is recorded. On failure the
    /// contracts that already made it on-chain are returned with the error.
    #[instrument(skip_all, fields(chain = %request.chain))]
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentOutcome, DeploymentFailure> {
        let mut deployed = Vec::new();
        match self.run(request, &mut deployed).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                error!(
                    kind = error.kind(),
                    already_deployed = ?deployed.iter().map(|r| (&r.name, r.address)).collect::<Vec<_>>(),
                    "deployment failed: {error}"
                );
                Err(DeploymentFailure { error, deployed })
            }
        }
    }

    async fn run(
        &self,
        request: &DeploymentRequest,
        deployed: &mut Vec<DeploymentResult>,
    ) -> Result<DeploymentOutcome, ProvisionError> {
        let chain = &request.chain;
        let settings = self.settings.as_ref();

        // local checks, no network yet
        if !settings.is_deployable(chain) {
            return Err(ProvisionError::ChainNotAllowed(chain.clone()));
        }
        let account = DeployerAccount::from_secret(
            self.secrets.deployer_key.as_ref(),
            &settings.deployer_key_env,
        )?;
        let plan = self.plan.load().await?;
        let required = settings.minimum_required(chain)?;
        let pool = EndpointPool::build(
            chain,
            settings,
            &self.secrets,
            request.rpc_url.as_deref(),
            &request.fallback_rpcs,
        )?;

        transition(chain, RunState::SelectingProvider);
        let bound = self.selector.select(&pool).await?;
        let client = DeadlineClient::wrap(bound.client.clone(), settings.timeouts.rpc());

        let mut lease = self.store.leases().acquire(chain, settings.timeouts.lease())?;

        transition(chain, RunState::CheckingBalance);
        let chain_id = client.chain_id().await?;
        if let Some(expected) = settings.chain(chain).map(|c| c.chain_id) {
            if expected != chain_id {
                return Err(ConfigError::Invalid(format!(
                    "{} reports chain id {chain_id}, {chain} is {expected}",
                    bound.endpoint.label
                ))
                .into());
            }
        }

        let balance = account.balance(client.as_ref()).await?;
        if balance < required {
            return Err(ProvisionError::InsufficientBalance {
                chain: chain.clone(),
                deployer: account.address(),
                balance,
                required,
            });
        }
        let nonce = account.next_nonce(client.as_ref()).await?;
        info!(deployer = ?account.address(), %balance, %nonce, "deployer ready");

        let mut session = DeploymentSession::new(chain.clone(), chain_id, &account, client, nonce);

        transition(chain, RunState::DeployingIndependents);
        for artifact in plan.independents() {
            lease.renew(settings.timeouts.lease())?;
            deployed.push(self.deployer.deploy(artifact, &mut session).await?);
        }

        transition(chain, RunState::DeployingDependents);
        for artifact in plan.dependents() {
            lease.renew(settings.timeouts.lease())?;
            deployed.push(self.deployer.deploy(artifact, &mut session).await?);
        }

        transition(chain, RunState::Persisting);
        let results = session.into_results();
        let record =
            DeploymentRecord::from_results(chain.clone(), account.address(), chain_id, &results);
        if let Some(missing) = plan
            .names()
            .into_iter()
            .find(|name| !record.contract_addresses.contains_key(*name))
        {
            return Err(PlanError::Artifact {
                name: missing.to_string(),
                reason: "no deployment result".into(),
            }
            .into());
        }
        self.store.upsert(&record).map_err(ProvisionError::Store)?;

        if let Err(e) = lease.release() {
            warn!(%chain, "failed to release lease: {e}");
        }
        transition(chain, RunState::Done);
        info!(
            contracts = record.contract_addresses.len(),
            gas_used = %record.metadata.gas_used_total,
            block = record.metadata.block_number,
            "deployment recorded"
        );

        Ok(DeploymentOutcome {
            record,
            results,
            endpoint: bound.endpoint,
        })
    }
}

fn transition(chain: &ChainName, state: RunState) {
    info!(%chain, %state, "deployment state");
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use ethers::{types::U256, utils::parse_ether};
    use provision_config::Secret;
    use provision_store::LeaseGuard;
    use url::Url;

    use super::*;
    use crate::{
        artifact::{DAI, POOL, USDC, USDT},
        error::{ChainError, DeployError},
        testing::{standard_plan, MockBehavior, MockConnector, DEV_KEY},
    };

    const PUBLIC: &str = "https://public.example/";

    struct Harness {
        orchestrator: DeploymentOrchestrator,
        connector: Arc<MockConnector>,
        store: DeploymentStore,
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.timeouts.probe_secs = 1;
        for chain in settings.chains.values_mut() {
            chain.public_rpcs = vec![Url::parse(PUBLIC).unwrap()];
        }
        settings
    }

    fn harness(connector: MockConnector, with_key: bool) -> Harness {
        let store = DeploymentStore::temporary().unwrap();
        harness_with(connector, with_key, settings(), store)
    }

    fn harness_with(
        connector: MockConnector,
        with_key: bool,
        settings: Settings,
        store: DeploymentStore,
    ) -> Harness {
        let secrets = Secrets {
            deployer_key: with_key.then(|| Secret::new(DEV_KEY)),
            ..Default::default()
        };
        let connector = Arc::new(connector.with_chain_id(1));
        let orchestrator = DeploymentOrchestrator::new(
            Arc::new(settings),
            Arc::new(secrets),
            store.clone(),
            connector.clone(),
            PlanSource::Fixed(Arc::new(standard_plan())),
        );
        Harness {
            orchestrator,
            connector,
            store,
        }
    }

    fn healthy() -> MockConnector {
        MockConnector::new(MockBehavior::Healthy { block: 1000 })
    }

    #[tokio::test]
    async fn deploys_tokens_then_pool_and_records_everything() {
        let h = harness(healthy(), true);

        let outcome = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap();

        let names: Vec<_> = outcome.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec![USDC, USDT, DAI, POOL]);
        assert_eq!(outcome.endpoint.url.as_str(), PUBLIC);
        assert!(outcome.record.metadata.block_number >= 1000);
        assert_eq!(outcome.record.metadata.network_id, 1);
        assert_eq!(
            outcome.record.metadata.gas_used_total,
            U256::from(4 * 1_000_000)
        );

        let stored = h.store.get(&"ethereum".into()).unwrap().unwrap();
        assert_eq!(stored.contract_addresses, outcome.record.contract_addresses);
        assert_eq!(stored.contract_addresses.len(), 4);
        assert!(!stored.verified);

        let nonces: Vec<_> = h.connector.submitted().iter().map(|t| t.nonce.as_u64()).collect();
        assert_eq!(nonces, vec![0, 1, 2, 3]);
        assert!(h.store.leases().current(&"ethereum".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_chain_reports_every_candidate() {
        let h = harness(MockConnector::new(MockBehavior::Down("refused".into())), true);
        let request = DeploymentRequest {
            chain: "ethereum".into(),
            rpc_url: Some("https://caller.example/".into()),
            fallback_rpcs: vec!["https://f1.example/".into(), "https://f2.example/".into()],
        };

        let failure = h.orchestrator.deploy(&request).await.unwrap_err();
        let ProvisionError::MultiEndpointFailure { failures, .. } = &failure.error else {
            panic!("unexpected {failure:?}");
        };
        let tried: Vec<_> = failures.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            tried,
            vec![
                "https://caller.example/",
                "https://f1.example/",
                "https://f2.example/",
                PUBLIC
            ]
        );
        assert!(failure.deployed.is_empty());
        assert!(h.store.get(&"ethereum".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn insufficient_balance_submits_nothing() {
        let h = harness(healthy().with_balance(parse_ether("0.01").unwrap()), true);

        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        match &failure.error {
            ProvisionError::InsufficientBalance {
                balance, required, ..
            } => {
                assert_eq!(*balance, parse_ether("0.01").unwrap());
                assert_eq!(*required, parse_ether("0.05").unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.connector.submitted().is_empty());
        assert_eq!(h.connector.gas_estimates(), 0);
        assert!(h.store.leases().current(&"ethereum".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn refuses_chains_outside_allow_list_before_network() {
        let h = harness(healthy(), true);
        for chain in ["goerli", "mars"] {
            let failure = h
                .orchestrator
                .deploy(&DeploymentRequest::new(chain))
                .await
                .unwrap_err();
            assert!(matches!(failure.error, ProvisionError::ChainNotAllowed(_)));
        }
        assert!(h.connector.probed().is_empty());
    }

    #[tokio::test]
    async fn refuses_to_run_without_signing_key() {
        let h = harness(healthy(), false);
        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ProvisionError::Config(ConfigError::MissingSigningKey { .. })
        ));
        assert_eq!(failure.kind(), "config_error");
        assert!(h.connector.probed().is_empty());
    }

    #[tokio::test]
    async fn failed_pool_reports_deployed_tokens_and_stores_nothing() {
        let h = harness(healthy().revert_submission(3), true);

        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ProvisionError::Deploy {
                ref artifact,
                source: DeployError::Reverted { .. },
            } if artifact == POOL
        ));
        let partial: Vec<_> = failure.deployed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(partial, vec![USDC, USDT, DAI]);
        assert!(h.store.get(&"ethereum".into()).unwrap().is_none());
        assert!(h.store.leases().current(&"ethereum".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_run_on_same_chain_is_refused() {
        let h = harness(healthy(), true);
        let _held = h
            .store
            .leases()
            .acquire(&"ethereum".into(), std::time::Duration::from_secs(60))
            .unwrap();

        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), "lease_held");
        assert!(h.connector.submitted().is_empty());
        assert_eq!(h.connector.probed().len(), 1);
    }

    #[tokio::test]
    async fn wrong_network_is_refused() {
        let h = harness(healthy(), true);
        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("polygon"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), "config_error");
        assert!(h.connector.submitted().is_empty());
    }

    #[tokio::test]
    async fn redeploy_replaces_record() {
        let h = harness(healthy(), true);
        let first = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap();
        h.store.mark_verified(&"ethereum".into()).unwrap();

        let second = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap();
        assert_ne!(
            first.record.contract_addresses,
            second.record.contract_addresses
        );
        let stored = h.store.get(&"ethereum".into()).unwrap().unwrap();
        assert_eq!(stored.contract_addresses, second.record.contract_addresses);
        assert!(!stored.verified);
    }

    #[tokio::test(start_paused = true)]
    async fn node_stalling_after_selection_ends_the_run() {
        let h = harness(healthy().stall_call("estimate_gas"), true);

        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ProvisionError::Deploy {
                source: DeployError::Estimate(_),
                ..
            }
        ));
        assert!(h.connector.submitted().is_empty());
        assert!(h.store.get(&"ethereum".into()).unwrap().is_none());
        assert!(h.store.leases().current(&"ethereum".into()).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_balance_check_is_a_chain_error() {
        let h = harness(healthy().stall_call("balance"), true);

        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ProvisionError::Chain(ChainError::Timeout { call: "eth_getBalance", secs: 30, .. })
        ));
        assert_eq!(failure.kind(), "chain_error");
        assert!(h.store.leases().current(&"ethereum".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn lease_lost_between_contracts_stops_submitting() {
        let store = DeploymentStore::temporary().unwrap();
        let mut settings = settings();
        // every renewal expires at once, so a second run may take the chain
        settings.timeouts.lease_secs = 0;

        let taken: Arc<Mutex<Option<LeaseGuard>>> = Arc::default();
        let connector = {
            let store = store.clone();
            let taken = taken.clone();
            healthy().on_submission(move |index| {
                if index == 0 {
                    let guard = store
                        .leases()
                        .acquire(&"ethereum".into(), Duration::from_secs(60))
                        .unwrap();
                    *taken.lock().unwrap() = Some(guard);
                }
            })
        };
        let h = harness_with(connector, true, settings, store);

        let failure = h
            .orchestrator
            .deploy(&DeploymentRequest::new("ethereum"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), "lease_held");
        let partial: Vec<_> = failure.deployed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(partial, vec![USDC]);
        assert_eq!(h.connector.submitted().len(), 1);
        assert!(h.store.get(&"ethereum".into()).unwrap().is_none());

        // the failed run must not remove the new holder's lease
        let holder = taken.lock().unwrap().as_ref().unwrap().lease().holder;
        assert_eq!(
            h.store.leases().current(&"ethereum".into()).unwrap().unwrap().holder,
            holder
        );
    }
}
