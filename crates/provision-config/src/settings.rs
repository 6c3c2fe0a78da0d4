use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use ethers::{types::U256, utils::parse_ether};
use provision_common::{database_path, types::ChainName};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Placeholder substituted with the provider API key in URL templates.
pub const KEY_PLACEHOLDER: &str = "{key}";

const DEFAULT_DB_NAME: &str = "deployments.db";

/// Everything the service needs besides secrets.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Authenticated providers, most preferred first.
    pub providers: Vec<ProviderSettings>,
    pub chains: BTreeMap<ChainName, ChainSettings>,
    /// Environment variable holding the deployer's private key.
    pub deployer_key_env: String,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub gas: GasSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub artifacts: ArtifactSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub name: String,
    /// Environment variable holding this provider's API key.
    pub key_env: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChainSettings {
    pub chain_id: u64,
    /// Whether deployments to this chain are allowed.
    pub deployable: bool,
    /// Minimum deployer balance in ether, e.g. `"0.05"`.
    pub min_balance: String,
    /// Keyless endpoints tried after all authenticated and caller endpoints.
    #[serde(default)]
    pub public_rpcs: Vec<Url>,
    /// URL templates per provider name, containing [`KEY_PLACEHOLDER`].
    #[serde(default)]
    pub provider_urls: BTreeMap<String, String>,
}

impl ChainSettings {
    pub fn min_balance_wei(&self, chain: &ChainName) -> Result<U256, Error> {
        parse_ether(self.min_balance.trim()).map_err(|e| {
            Error::InvalidAmount {
                chain: chain.clone(),
                value: self.min_balance.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// The provider URL for `provider` with `key` substituted.
    pub fn provider_url(
        &self,
        chain: &ChainName,
        provider: &str,
        key: &str,
    ) -> Option<Result<Url, Error>> {
        let template = self.provider_urls.get(provider)?;
        Some(
            Url::parse(&template.replace(KEY_PLACEHOLDER, key)).map_err(|e| {
                Error::InvalidProviderUrl {
                    provider: provider.to_string(),
                    chain: chain.clone(),
                    reason: e.to_string(),
                }
            }),
        )
    }

    /// The provider URL template with the key masked, for logs and reports.
    pub fn provider_label(&self, provider: &str) -> Option<String> {
        self.provider_urls
            .get(provider)
            .map(|t| t.replace(KEY_PLACEHOLDER, "***"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    /// Upper bound for a single endpoint liveness probe.
    pub probe_secs: u64,
    /// Upper bound for any other single node request once an endpoint is bound.
    #[serde(default = "Timeouts::default_rpc_secs")]
    pub rpc_secs: u64,
    /// Upper bound for a deployment transaction to be included.
    pub confirmation_secs: u64,
    /// Lifetime of a per-chain deployment lease. Renewed before every
    /// contract, so it must cover one contract's node requests and its
    /// confirmation wait.
    pub lease_secs: u64,
    /// Receipt polling interval.
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: 8,
            rpc_secs: Self::default_rpc_secs(),
            confirmation_secs: 180,
            lease_secs: 900,
            poll_interval_ms: 2000,
        }
    }
}

impl Timeouts {
    /// Requests a contract deployment makes before its confirmation wait:
    /// estimate, gas price and broadcast.
    pub const REQUESTS_PER_CONTRACT: u64 = 3;

    fn default_rpc_secs() -> u64 {
        30
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn rpc(&self) -> Duration {
        Duration::from_secs(self.rpc_secs)
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GasSettings {
    /// Percentage added on top of the node's gas estimate.
    pub buffer_percent: u64,
}

impl Default for GasSettings {
    fn default() -> Self {
        Self { buffer_percent: 20 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSettings {
    /// How many candidate endpoints are probed.
    pub sample_size: usize,
    /// How many probes run at the same time.
    pub concurrency: usize,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            sample_size: 5,
            concurrency: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    /// sled database directory. Defaults to `$PROVISION_DB_ROOT_PATH/deployments.db`.
    pub path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| database_path(DEFAULT_DB_NAME))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSettings {
    /// Directory with compiler output, one `<Name>.json` per contract.
    pub dir: PathBuf,
    /// Optional deployment plan file replacing the standard token/pool plan.
    pub plan: Option<PathBuf>,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("contracts/out"),
            plan: None,
        }
    }
}

impl Settings {
    pub fn chain(&self, chain: &ChainName) -> Option<&ChainSettings> {
        self.chains.get(chain)
    }

    pub fn is_deployable(&self, chain: &ChainName) -> bool {
        self.chain(chain).is_some_and(|c| c.deployable)
    }

    /// Minimum deployer balance for `chain`, zero for unknown chains.
    pub fn minimum_required(&self, chain: &ChainName) -> Result<U256, Error> {
        match self.chain(chain) {
            Some(c) => c.min_balance_wei(chain),
            None => Ok(U256::zero()),
        }
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.deployer_key_env.trim().is_empty() {
            return Err(Error::Invalid("deployerKeyEnv must not be empty".into()));
        }
        if self.gas.buffer_percent > 500 {
            return Err(Error::Invalid(format!(
                "gas buffer of {}% is not sane",
                self.gas.buffer_percent
            )));
        }
        let per_contract = self
            .timeouts
            .rpc_secs
            .saturating_mul(Timeouts::REQUESTS_PER_CONTRACT)
            .saturating_add(self.timeouts.confirmation_secs);
        if self.timeouts.lease_secs <= per_contract {
            return Err(Error::Invalid(format!(
                "leaseSecs ({}) must exceed the {per_contract}s one contract deployment may take",
                self.timeouts.lease_secs
            )));
        }
        if self.timeouts.rpc_secs == 0 {
            return Err(Error::Invalid("rpcSecs must be at least 1".into()));
        }
        if self.diagnostics.concurrency == 0 {
            return Err(Error::Invalid(
                "diagnostics concurrency must be at least 1".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::Invalid(format!(
                    "provider {} is listed twice",
                    provider.name
                )));
            }
        }

        for (name, chain) in &self.chains {
            chain.min_balance_wei(name)?;
            for (provider, template) in &chain.provider_urls {
                if !template.contains(KEY_PLACEHOLDER) {
                    return Err(Error::InvalidProviderUrl {
                        provider: provider.clone(),
                        chain: name.clone(),
                        reason: format!("template has no {KEY_PLACEHOLDER} placeholder"),
                    });
                }
                if let Some(Err(e)) = chain.provider_url(name, provider, "key") {
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn urls(list: &[&str]) -> Vec<Url> {
    list.iter().filter_map(|u| Url::parse(u).ok()).collect()
}

fn templates(list: &[(&str, &str)]) -> BTreeMap<String, String> {
    list.iter()
        .map(|(p, t)| (p.to_string(), t.to_string()))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        let mut chains = BTreeMap::new();

        chains.insert(
            ChainName::new("ethereum"),
            ChainSettings {
                chain_id: 1,
                deployable: true,
                min_balance: "0.05".into(),
                public_rpcs: urls(&[
                    "https://eth.llamarpc.com",
                    "https://ethereum-rpc.publicnode.com",
                    "https://cloudflare-eth.com",
                ]),
                provider_urls: templates(&[
                    ("alchemy", "https://eth-mainnet.g.alchemy.com/v2/{key}"),
                    ("infura", "https://mainnet.infura.io/v3/{key}"),
                    ("ankr", "https://rpc.ankr.com/eth/{key}"),
                ]),
            },
        );
        chains.insert(
            ChainName::new("sepolia"),
            ChainSettings {
                chain_id: 11155111,
                deployable: true,
                min_balance: "0.01".into(),
                public_rpcs: urls(&[
                    "https://ethereum-sepolia-rpc.publicnode.com",
                    "https://rpc.sepolia.org",
                ]),
                provider_urls: templates(&[
                    ("alchemy", "https://eth-sepolia.g.alchemy.com/v2/{key}"),
                    ("infura", "https://sepolia.infura.io/v3/{key}"),
                    ("ankr", "https://rpc.ankr.com/eth_sepolia/{key}"),
                ]),
            },
        );
        chains.insert(
            ChainName::new("polygon"),
            ChainSettings {
                chain_id: 137,
                deployable: true,
                min_balance: "1".into(),
                public_rpcs: urls(&[
                    "https://polygon-rpc.com",
                    "https://polygon-bor-rpc.publicnode.com",
                ]),
                provider_urls: templates(&[
                    ("alchemy", "https://polygon-mainnet.g.alchemy.com/v2/{key}"),
                    ("infura", "https://polygon-mainnet.infura.io/v3/{key}"),
                    ("ankr", "https://rpc.ankr.com/polygon/{key}"),
                ]),
            },
        );
        chains.insert(
            ChainName::new("arbitrum"),
            ChainSettings {
                chain_id: 42161,
                deployable: true,
                min_balance: "0.005".into(),
                public_rpcs: urls(&["https://arb1.arbitrum.io/rpc"]),
                provider_urls: templates(&[
                    ("alchemy", "https://arb-mainnet.g.alchemy.com/v2/{key}"),
                    ("infura", "https://arbitrum-mainnet.infura.io/v3/{key}"),
                    ("ankr", "https://rpc.ankr.com/arbitrum/{key}"),
                ]),
            },
        );
        chains.insert(
            ChainName::new("base"),
            ChainSettings {
                chain_id: 8453,
                deployable: true,
                min_balance: "0.005".into(),
                public_rpcs: urls(&["https://mainnet.base.org"]),
                provider_urls: templates(&[
                    ("alchemy", "https://base-mainnet.g.alchemy.com/v2/{key}"),
                    ("infura", "https://base-mainnet.infura.io/v3/{key}"),
                    ("ankr", "https://rpc.ankr.com/base/{key}"),
                ]),
            },
        );
        chains.insert(
            ChainName::new("bsc"),
            ChainSettings {
                chain_id: 56,
                deployable: true,
                min_balance: "0.01".into(),
                public_rpcs: urls(&[
                    "https://bsc-dataseed.binance.org",
                    "https://bsc-rpc.publicnode.com",
                ]),
                provider_urls: templates(&[("ankr", "https://rpc.ankr.com/bsc/{key}")]),
            },
        );
        chains.insert(
            ChainName::new("goerli"),
            ChainSettings {
                chain_id: 5,
                deployable: false,
                min_balance: "0.01".into(),
                public_rpcs: urls(&["https://rpc.ankr.com/eth_goerli"]),
                provider_urls: BTreeMap::new(),
            },
        );
        chains.insert(
            ChainName::new("localhost"),
            ChainSettings {
                chain_id: 31337,
                deployable: true,
                min_balance: "0".into(),
                public_rpcs: urls(&["http://127.0.0.1:8545"]),
                provider_urls: BTreeMap::new(),
            },
        );

        Self {
            providers: vec![
                ProviderSettings {
                    name: "alchemy".into(),
                    key_env: "ALCHEMY_API_KEY".into(),
                },
                ProviderSettings {
                    name: "infura".into(),
                    key_env: "INFURA_API_KEY".into(),
                },
                ProviderSettings {
                    name: "ankr".into(),
                    key_env: "ANKR_API_KEY".into(),
                },
            ],
            chains,
            deployer_key_env: "DEPLOYER_PRIVATE_KEY".into(),
            timeouts: Timeouts::default(),
            gas: GasSettings::default(),
            diagnostics: DiagnosticsSettings::default(),
            store: StoreSettings::default(),
            artifacts: ArtifactSettings::default(),
        }
    }
}
