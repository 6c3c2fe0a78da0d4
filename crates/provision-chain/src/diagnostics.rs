use std::{collections::BTreeMap, sync::Arc};

use ethers::{
    types::{Address, U256},
    utils::format_ether,
};
use futures_util::{stream, StreamExt};
use provision_common::{
    serialization::encoding::u256_decimal_opt,
    types::ChainName,
};
use provision_config::{Secrets, Settings};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    account::DeployerAccount,
    client::{ChainClient, Connector, DeadlineClient},
    endpoint::EndpointPool,
    probe::{EndpointProbe, EndpointTest},
};

const CHECK_WEIGHT: u8 = 25;

/// Point-in-time readiness of one chain. Never persisted.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub chain: ChainName,
    /// Secret env var name to whether it is set. Values are never included.
    pub secrets_present: BTreeMap<String, bool>,
    /// Probe results keyed by redacted endpoint label.
    pub endpoint_tests: BTreeMap<String, EndpointTest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployer_address: Option<Address>,
    #[serde(with = "u256_decimal_opt", skip_serializing_if = "Option::is_none")]
    pub deployer_balance: Option<U256>,
    pub health_score: u8,
    pub recommendations: Vec<String>,
}

/// Read-only health checks. Every check runs even when earlier ones fail.
#[derive(Clone)]
pub struct Diagnostics {
    settings: Arc<Settings>,
    secrets: Arc<Secrets>,
    probe: EndpointProbe,
}

impl Diagnostics {
    pub fn new(
        settings: Arc<Settings>,
        secrets: Arc<Secrets>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let probe = EndpointProbe::new(connector, settings.timeouts.probe());
        Self {
            settings,
            secrets,
            probe,
        }
    }

    #[instrument(skip(self))]
    pub async fn diagnose(&self, chain: &ChainName) -> DiagnosticReport {
        let settings = self.settings.as_ref();
        let mut recommendations = Vec::new();

        // (a) secrets
        let secrets_present = self.secrets.presence(settings);
        let account = match DeployerAccount::from_secret(
            self.secrets.deployer_key.as_ref(),
            &settings.deployer_key_env,
        ) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!("deployer key unusable: {e}");
                recommendations.push(if self.secrets.deployer_key.is_some() {
                    format!(
                        "the deployment key in {} is not a valid private key, replace it",
                        settings.deployer_key_env
                    )
                } else {
                    format!(
                        "configure the deployment key: set {}",
                        settings.deployer_key_env
                    )
                });
                None
            }
        };

        let has_provider_key = !self.secrets.provider_keys.is_empty();
        if !has_provider_key {
            let envs: Vec<_> = settings.providers.iter().map(|p| p.key_env.as_str()).collect();
            recommendations.push(format!(
                "add at least one RPC provider key ({})",
                envs.join(", ")
            ));
        }

        // (b) endpoints
        let (endpoint_tests, reachable) = match EndpointPool::build(
            chain,
            settings,
            &self.secrets,
            None,
            &[],
        ) {
            Ok(pool) => self.probe_sample(&pool).await,
            Err(e) => {
                recommendations.push(format!("fix chain configuration: {e}"));
                (BTreeMap::new(), None)
            }
        };
        let is_reachable = reachable.is_some();
        if !is_reachable && !endpoint_tests.is_empty() {
            recommendations.push(format!(
                "no RPC endpoint for {chain} responded, check provider keys and network access"
            ));
        }

        // (c) balance
        let required = match settings.minimum_required(chain) {
            Ok(required) => Some(required),
            Err(e) => {
                recommendations.push(format!("fix the minimum balance setting: {e}"));
                None
            }
        };
        let mut deployer_balance = None;
        if let (Some(account), Some(client)) = (&account, reachable) {
            let client = DeadlineClient::wrap(client, settings.timeouts.rpc());
            match account.balance(client.as_ref()).await {
                Ok(balance) => deployer_balance = Some(balance),
                Err(e) => warn!("balance query failed: {e}"),
            }
        }
        let funded = matches!((deployer_balance, required), (Some(b), Some(r)) if b >= r);
        if let (Some(account), false, Some(required)) = (&account, funded, required) {
            recommendations.push(match deployer_balance {
                Some(balance) => {
                    format!(
                        "fund deployer wallet {:?}: balance {} ETH, at least {} ETH required",
                        account.address(),
                        format_ether(balance),
                        format_ether(required)
                    )
                }
                None => {
                    format!(
                        "could not read the balance of deployer wallet {:?}",
                        account.address()
                    )
                }
            });
        }

        // (d) score
        let health_score = [account.is_some(), has_provider_key, is_reachable, funded]
            .iter()
            .filter(|ok| **ok)
            .count() as u8
            * CHECK_WEIGHT;

        info!(%chain, health_score, issues = recommendations.len(), "diagnostics done");

        DiagnosticReport {
            chain: chain.clone(),
            secrets_present,
            endpoint_tests,
            deployer_address: account.map(|a| a.address()),
            deployer_balance,
            health_score,
            recommendations,
        }
    }

    /// Probes the first `sampleSize` candidates with bounded concurrency.
    /// Returns the tests and the best ranked reachable client.
    async fn probe_sample(
        &self,
        pool: &EndpointPool,
    ) -> (BTreeMap<String, EndpointTest>, Option<Arc<dyn ChainClient>>) {
        let diagnostics = &self.settings.diagnostics;
        let mut probed: Vec<_> = stream::iter(
            pool.candidates()
                .iter()
                .take(diagnostics.sample_size)
                .cloned(),
        )
        .map(|endpoint| {
            async move {
                let (client, outcome) = self.probe.probe(&endpoint).await;
                (endpoint, client, outcome)
            }
        })
        .buffer_unordered(diagnostics.concurrency.max(1))
        .collect()
        .await;
        probed.sort_by_key(|(endpoint, _, _)| endpoint.source_rank);

        let mut reachable = None;
        let mut tests = BTreeMap::new();
        for (endpoint, client, outcome) in probed {
            if reachable.is_none() && outcome.is_reachable() {
                reachable = client;
            }
            tests.insert(endpoint.label.clone(), EndpointTest::new(&endpoint, &outcome));
        }
        (tests, reachable)
    }
}
