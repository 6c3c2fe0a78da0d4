use std::collections::HashSet;

use provision_common::types::{ChainName, EndpointSource, RpcEndpoint};
use provision_config::{Error as ConfigError, Secrets, Settings};
use tracing::debug;
use url::Url;

/// Ordered, deduplicated candidate endpoints for one chain.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    chain: ChainName,
    candidates: Vec<RpcEndpoint>,
}

impl EndpointPool {
    /// Candidates in preference order: authenticated providers (settings
    /// order, key present), caller `rpc_url`, caller `fallback_rpcs`, then the
    /// chain's public RPCs. The first occurrence of a URL wins.
    pub fn build(
        chain: &ChainName,
        settings: &Settings,
        secrets: &Secrets,
        rpc_url: Option<&str>,
        fallback_rpcs: &[String],
    ) -> Result<Self, ConfigError> {
        let chain_settings = settings.chain(chain);
        if chain_settings.is_none() && rpc_url.is_none() && fallback_rpcs.is_empty() {
            return Err(ConfigError::UnknownChain(chain.clone()));
        }

        let mut ordered: Vec<(Url, EndpointSource, Option<String>)> = Vec::new();

        if let Some(chain_settings) = chain_settings {
            for provider in &settings.providers {
                let Some(key) = secrets.provider_key(&provider.name) else {
                    continue;
                };
                let Some(url) = chain_settings.provider_url(chain, &provider.name, key.expose())
                else {
                    continue;
                };
                ordered.push((
                    url?,
                    EndpointSource::Authenticated {
                        provider: provider.name.clone(),
                    },
                    chain_settings.provider_label(&provider.name),
                ));
            }
        }

        if let Some(rpc_url) = rpc_url {
            ordered.push((parse_caller_url("rpcUrl", rpc_url)?, EndpointSource::Caller, None));
        }
        for fallback in fallback_rpcs {
            ordered.push((
                parse_caller_url("fallbackRpcs", fallback)?,
                EndpointSource::Fallback,
                None,
            ));
        }

        if let Some(chain_settings) = chain_settings {
            for url in &chain_settings.public_rpcs {
                ordered.push((url.clone(), EndpointSource::Public, None));
            }
        }

        let mut seen = HashSet::new();
        let candidates: Vec<RpcEndpoint> = ordered
            .into_iter()
            .filter(|(url, _, _)| seen.insert(url.as_str().to_string()))
            .enumerate()
            .map(|(rank, (url, source, label))| {
                let endpoint = RpcEndpoint::new(url, source, rank);
                match label {
                    Some(label) => endpoint.with_label(label),
                    None => endpoint,
                }
            })
            .collect();

        if candidates.is_empty() {
            return Err(ConfigError::NoEndpoints(chain.clone()));
        }

        debug!(
            %chain,
            candidates = candidates.len(),
            authenticated = candidates.iter().filter(|c| c.authenticated).count(),
            "built endpoint pool"
        );

        Ok(Self {
            chain: chain.clone(),
            candidates,
        })
    }

    pub fn chain(&self) -> &ChainName {
        &self.chain
    }

    pub fn candidates(&self) -> &[RpcEndpoint] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn parse_caller_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::Invalid(format!("{field} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => {
            Err(ConfigError::Invalid(format!(
                "{field} must be http or https, got {scheme}"
            )))
        }
    }
}
