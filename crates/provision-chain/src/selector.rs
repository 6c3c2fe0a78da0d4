use std::{sync::Arc, time::Duration};

use provision_common::types::RpcEndpoint;
use tracing::{info, instrument};

use crate::{
    client::ChainClient,
    endpoint::EndpointPool,
    error::{EndpointFailure, ProvisionError},
    probe::{EndpointProbe, ProbeOutcome},
};

/// A live client for the endpoint that answered first.
#[derive(Clone)]
pub struct BoundClient {
    pub endpoint: RpcEndpoint,
    pub client: Arc<dyn ChainClient>,
    pub block_number: u64,
    pub latency: Duration,
}

impl std::fmt::Debug for BoundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundClient")
            .field("endpoint", &self.endpoint)
            .field("block_number", &self.block_number)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ProviderSelector {
    probe: EndpointProbe,
}

impl ProviderSelector {
    pub fn new(probe: EndpointProbe) -> Self {
        Self { probe }
    }

    /// Probes candidates one at a time in rank order and binds the first one
    /// that answers. Each candidate gets exactly one probe.
    #[instrument(skip_all, fields(chain = %pool.chain()))]
    pub async fn select(&self, pool: &EndpointPool) -> Result<BoundClient, ProvisionError> {
        let mut failures = Vec::with_capacity(pool.len());

        for endpoint in pool.candidates() {
            match self.probe.probe(endpoint).await {
                (
                    Some(client),
                    ProbeOutcome::Reachable {
                        block_number,
                        latency,
                    },
                ) => {
                    info!(%endpoint, block_number, ?latency, "selected endpoint");
                    return Ok(BoundClient {
                        endpoint: endpoint.clone(),
                        client,
                        block_number,
                        latency,
                    });
                }
                (_, outcome) => {
                    let error = match outcome {
                        ProbeOutcome::Unreachable { error, .. } => error,
                        ProbeOutcome::Reachable { .. } => "no client".to_string(),
                    };
                    failures.push(EndpointFailure {
                        label: endpoint.label.clone(),
                        authenticated: endpoint.authenticated,
                        source_rank: endpoint.source_rank,
                        error,
                    });
                }
            }
        }

        Err(ProvisionError::MultiEndpointFailure {
            chain: pool.chain().clone(),
            failures,
        })
    }
}
