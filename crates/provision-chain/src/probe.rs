use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use provision_common::types::RpcEndpoint;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{ChainClient, Connector};

/// Result of a single liveness check. Probing never fails, it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { block_number: u64, latency: Duration },
    Unreachable { error: String, latency: Duration },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }

    pub fn latency(&self) -> Duration {
        match self {
            Self::Reachable { latency, .. } | Self::Unreachable { latency, .. } => *latency,
        }
    }
}

/// Serializable view of a probe, as shown in diagnostic reports.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTest {
    pub ok: bool,
    pub source_rank: usize,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl EndpointTest {
    pub fn new(endpoint: &RpcEndpoint, outcome: &ProbeOutcome) -> Self {
        let (block_number, error) = match outcome {
            ProbeOutcome::Reachable { block_number, .. } => (Some(*block_number), None),
            ProbeOutcome::Unreachable { error, .. } => (None, Some(error.clone())),
        };
        Self {
            ok: outcome.is_reachable(),
            source_rank: endpoint.source_rank,
            authenticated: endpoint.authenticated,
            block_number,
            error,
            latency_ms: outcome.latency().as_millis() as u64,
        }
    }
}

/// Head-block query raced against a deadline.
pub async fn probe(client: &dyn ChainClient, timeout: Duration) -> ProbeOutcome {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, client.block_number()).await {
        Ok(Ok(block_number)) => {
            ProbeOutcome::Reachable {
                block_number,
                latency: started.elapsed(),
            }
        }
        Ok(Err(e)) => {
            ProbeOutcome::Unreachable {
                error: e.to_string(),
                latency: started.elapsed(),
            }
        }
        Err(_) => {
            ProbeOutcome::Unreachable {
                error: format!("timed out after {}ms", timeout.as_millis()),
                latency: started.elapsed(),
            }
        }
    };

    match &outcome {
        ProbeOutcome::Reachable {
            block_number,
            latency,
        } => debug!(endpoint = %client.endpoint(), block_number, ?latency, "endpoint reachable"),
        ProbeOutcome::Unreachable { error, .. } => {
            warn!(endpoint = %client.endpoint(), error = %error, "endpoint unreachable")
        }
    }
    outcome
}

/// Connects to an endpoint and probes it. Connection failures are reported
/// as unreachable.
#[derive(Clone)]
pub struct EndpointProbe {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl EndpointProbe {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn probe(
        &self,
        endpoint: &RpcEndpoint,
    ) -> (Option<Arc<dyn ChainClient>>, ProbeOutcome) {
        let started = Instant::now();
        match self.connector.connect(endpoint).await {
            Ok(client) => {
                let outcome = probe(client.as_ref(), self.timeout).await;
                (Some(client), outcome)
            }
            Err(e) => {
                warn!(%endpoint, "cannot build client: {e}");
                (
                    None,
                    ProbeOutcome::Unreachable {
                        error: e.to_string(),
                        latency: started.elapsed(),
                    },
                )
            }
        }
    }
}
