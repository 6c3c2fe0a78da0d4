use std::{collections::BTreeMap, fmt};

use zeroize::Zeroizing;

use crate::settings::Settings;

/// A value read from the environment that must never be printed.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Secrets the service runs with. Only ever sourced from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub deployer_key: Option<Secret>,
    /// API keys by provider name.
    pub provider_keys: BTreeMap<String, Secret>,
}

impl Secrets {
    pub fn from_env(settings: &Settings) -> Self {
        Self::from_lookup(settings, |name| std::env::var(name).ok())
    }

    /// Reads secrets through `lookup`; empty or whitespace-only values count as unset.
    pub fn from_lookup<F>(settings: &Settings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(Secret::new)
        };

        let deployer_key = read(&settings.deployer_key_env);
        let provider_keys = settings
            .providers
            .iter()
            .filter_map(|p| read(&p.key_env).map(|key| (p.name.clone(), key)))
            .collect();

        Self {
            deployer_key,
            provider_keys,
        }
    }

    pub fn provider_key(&self, provider: &str) -> Option<&Secret> {
        self.provider_keys.get(provider)
    }

    /// Which secret environment variables are set, keyed by variable name.
    pub fn presence(&self, settings: &Settings) -> BTreeMap<String, bool> {
        let mut presence = BTreeMap::new();
        presence.insert(
            settings.deployer_key_env.clone(),
            self.deployer_key.is_some(),
        );
        for provider in &settings.providers {
            presence.insert(
                provider.key_env.clone(),
                self.provider_keys.contains_key(&provider.name),
            );
        }
        presence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "DEPLOYER_PRIVATE_KEY" => Some("0xdeadbeef".into()),
            "ALCHEMY_API_KEY" => Some("alchemy-key".into()),
            "INFURA_API_KEY" => Some("   ".into()),
            _ => None,
        }
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings = Settings::default();
        let secrets = Secrets::from_lookup(&settings, lookup);

        assert_eq!(secrets.deployer_key.as_ref().unwrap().expose(), "0xdeadbeef");
        assert!(secrets.provider_key("alchemy").is_some());
        assert!(secrets.provider_key("infura").is_none());
        assert!(secrets.provider_key("ankr").is_none());

        let presence = secrets.presence(&settings);
        assert_eq!(presence["DEPLOYER_PRIVATE_KEY"], true);
        assert_eq!(presence["ALCHEMY_API_KEY"], true);
        assert_eq!(presence["INFURA_API_KEY"], false);
        assert_eq!(presence["ANKR_API_KEY"], false);
    }

    #[test]
    fn debug_does_not_leak() {
        let secret = Secret::new("super-secret");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        let secrets = Secrets {
            deployer_key: Some(secret),
            provider_keys: BTreeMap::new(),
        };
        assert!(!format!("{secrets:?}").contains("super-secret"));
    }
}
