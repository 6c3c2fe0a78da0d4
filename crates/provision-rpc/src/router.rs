use std::sync::{Arc, LazyLock};

use provision_chain::{
    Connector,
    DeploymentOrchestrator,
    Diagnostics,
    PlanSource,
};
use provision_common::types::ChainName;
use provision_config::{Secrets, Settings};
use provision_store::{DeploymentStore, StoreError};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::{
    metrics::Metrics,
    operation::{DeployParams, Operation, FORBIDDEN_FIELDS},
    response::{
        to_value,
        AddressesResponse,
        DeployResponse,
        DiagnoseResponse,
        FailureResponse,
        HealthResponse,
        StatusResponse,
        VerifyResponse,
    },
};

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::init);

const INVALID_REQUEST: &str = "invalid_request";
const NOT_FOUND: &str = "not_found";
const STORE_ERROR: &str = "store_error";

/// Validates operations at the boundary and hands them to the orchestrator,
/// the store or diagnostics. Every answer is a JSON object with `success`.
#[derive(Clone)]
pub struct OperationRouter {
    settings: Arc<Settings>,
    secrets: Arc<Secrets>,
    store: DeploymentStore,
    orchestrator: DeploymentOrchestrator,
    diagnostics: Diagnostics,
}

impl OperationRouter {
    pub fn new(
        settings: Arc<Settings>,
        secrets: Arc<Secrets>,
        store: DeploymentStore,
        connector: Arc<dyn Connector>,
        plan: PlanSource,
    ) -> Self {
        let orchestrator = DeploymentOrchestrator::new(
            settings.clone(),
            secrets.clone(),
            store.clone(),
            connector.clone(),
            plan,
        );
        let diagnostics = Diagnostics::new(settings.clone(), secrets.clone(), connector);
        Self {
            settings,
            secrets,
            store,
            orchestrator,
            diagnostics,
        }
    }

    /// Parses a raw `{"operation": ..}` body, then dispatches it.
    pub async fn dispatch_json(&self, body: Value) -> Value {
        match parse_operation(body) {
            Ok(operation) => self.dispatch(operation).await,
            Err(rejection) => {
                METRICS.inc_operations("invalid", false);
                to_value(&rejection)
            }
        }
    }

    #[instrument(skip_all, fields(operation = operation.name()))]
    pub async fn dispatch(&self, operation: Operation) -> Value {
        let name = operation.name();
        if operation.chain().is_some_and(ChainName::is_empty) {
            METRICS.inc_operations(name, false);
            return to_value(&FailureResponse::new(INVALID_REQUEST, "chain is required"));
        }

        let response = match operation {
            Operation::Deploy(params) => self.deploy(params).await,
            Operation::GetAddresses(p) => self.get_addresses(&p.chain),
            Operation::GetStatus => self.get_status(),
            Operation::Verify(p) => self.verify(&p.chain),
            Operation::Diagnose(p) => self.diagnose(&p.chain).await,
            Operation::HealthCheck => self.health_check(),
        };

        let success = response
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        METRICS.inc_operations(name, success);
        response
    }

    pub async fn deploy(&self, params: DeployParams) -> Value {
        let chain = params.chain.clone();
        match self.orchestrator.deploy(&params.into()).await {
            Ok(outcome) => {
                METRICS.inc_deployments(chain.as_str(), "ok");
                to_value(&DeployResponse::from(&outcome))
            }
            Err(failure) => {
                METRICS.inc_deployments(chain.as_str(), failure.kind());
                to_value(&FailureResponse::from_failure(&failure))
            }
        }
    }

    pub fn get_addresses(&self, chain: &ChainName) -> Value {
        match self.store.get(chain) {
            Ok(Some(record)) => {
                to_value(&AddressesResponse {
                    success: true,
                    chain: record.chain.clone(),
                    addresses: record.addresses(),
                    verified: record.verified,
                })
            }
            Ok(None) => to_value(&not_found(chain)),
            Err(e) => to_value(&store_failure(e)),
        }
    }

    pub fn get_status(&self) -> Value {
        match self.store.list_all() {
            Ok(deployments) => {
                to_value(&StatusResponse {
                    success: true,
                    deployments,
                })
            }
            Err(e) => to_value(&store_failure(e)),
        }
    }

    pub fn verify(&self, chain: &ChainName) -> Value {
        match self.store.mark_verified(chain) {
            Ok(changed) => {
                if changed {
                    info!(%chain, "deployment marked verified");
                }
                let message = if changed {
                    format!("deployment on {chain} marked as verified")
                } else {
                    format!("deployment on {chain} was already verified")
                };
                to_value(&VerifyResponse {
                    success: true,
                    message,
                    chain: chain.clone(),
                    verified: true,
                    changed,
                })
            }
            Err(StoreError::NotFound(_)) => to_value(&not_found(chain)),
            Err(e) => to_value(&store_failure(e)),
        }
    }

    pub async fn diagnose(&self, chain: &ChainName) -> Value {
        let report = self.diagnostics.diagnose(chain).await;
        to_value(&DiagnoseResponse {
            success: true,
            report,
        })
    }

    pub fn health_check(&self) -> Value {
        to_value(&HealthResponse {
            success: true,
            status: "healthy".to_string(),
            secrets_configured: self.secrets.presence(&self.settings),
        })
    }
}

fn parse_operation(body: Value) -> Result<Operation, FailureResponse> {
    let Value::Object(fields) = &body else {
        return Err(FailureResponse::new(
            INVALID_REQUEST,
            "request body must be a JSON object",
        ));
    };

    if let Some(field) = FORBIDDEN_FIELDS.iter().find(|f| fields.contains_key(**f)) {
        warn!(%field, "rejected request carrying key material");
        return Err(FailureResponse::new(
            INVALID_REQUEST,
            format!("{field} is not accepted in requests, the deployment key is read from the server environment"),
        ));
    }

    serde_json::from_value(body)
        .map_err(|e| FailureResponse::new(INVALID_REQUEST, format!("invalid operation: {e}")))
}

fn not_found(chain: &ChainName) -> FailureResponse {
    FailureResponse::new(NOT_FOUND, format!("no deployment recorded for {chain}"))
}

fn store_failure(e: StoreError) -> FailureResponse {
    error!("store error: {e}");
    FailureResponse::new(STORE_ERROR, e)
}

#[cfg(test)]
mod tests {
    use ethers::types::U256;
    use provision_chain::testing::{standard_plan, MockBehavior, MockConnector, DEV_KEY};
    use provision_config::Secret;
    use serde_json::json;
    use url::Url;

    use super::*;

    const PUBLIC: &str = "https://public.example/";

    fn router(connector: MockConnector, with_key: bool) -> OperationRouter {
        let mut settings = Settings::default();
        settings.timeouts.probe_secs = 1;
        for chain in settings.chains.values_mut() {
            chain.public_rpcs = vec![Url::parse(PUBLIC).unwrap()];
        }
        let secrets = Secrets {
            deployer_key: with_key.then(|| Secret::new(DEV_KEY)),
            ..Default::default()
        };
        OperationRouter::new(
            Arc::new(settings),
            Arc::new(secrets),
            DeploymentStore::temporary().unwrap(),
            Arc::new(connector.with_chain_id(1)),
            PlanSource::Fixed(Arc::new(standard_plan())),
        )
    }

    fn healthy() -> MockConnector {
        MockConnector::new(MockBehavior::Healthy { block: 1000 })
    }

    #[tokio::test]
    async fn addresses_match_what_deploy_returned() {
        let router = router(healthy(), true);

        let deployed = router
            .dispatch_json(json!({"operation": "deploy", "chain": "ethereum"}))
            .await;
        assert_eq!(deployed["success"], true, "{deployed}");
        assert_eq!(deployed["endpoint"], PUBLIC);
        assert_eq!(deployed["gasUsed"], "4000000");
        let contracts = deployed["contracts"].as_object().unwrap().clone();
        assert_eq!(contracts.len(), 4);

        let listed = router
            .dispatch_json(json!({"operation": "get_addresses", "chain": "ethereum"}))
            .await;
        assert_eq!(listed["success"], true);
        let addresses = listed["addresses"].as_array().unwrap();
        assert_eq!(addresses.len(), contracts.len());
        for entry in addresses {
            let name = entry["name"].as_str().unwrap();
            assert_eq!(entry["address"], contracts[name]);
        }

        let status = router.dispatch(Operation::GetStatus).await;
        assert_eq!(status["deployments"][0]["chain"], "ethereum");
        assert_eq!(status["deployments"][0]["verified"], false);
    }

    #[tokio::test]
    async fn verify_is_idempotent() {
        let router = router(healthy(), true);
        router
            .dispatch_json(json!({"operation": "deploy", "chain": "ethereum"}))
            .await;

        let body = json!({"operation": "verify", "chain": "ethereum"});
        let first = router.dispatch_json(body.clone()).await;
        let second = router.dispatch_json(body).await;

        assert_eq!(first["success"], true);
        assert_eq!(first["verified"], true);
        assert_eq!(first["changed"], true);
        assert_eq!(second["success"], true);
        assert_eq!(second["verified"], true);
        assert_eq!(second["changed"], false);

        let listed = router.get_addresses(&"ethereum".into());
        assert_eq!(listed["verified"], true);
    }

    #[tokio::test]
    async fn unknown_chain_lookups_are_not_found() {
        let router = router(healthy(), true);

        let listed = router.get_addresses(&"sepolia".into());
        assert_eq!(listed["success"], false);
        assert_eq!(listed["kind"], NOT_FOUND);

        let verified = router.verify(&"sepolia".into());
        assert_eq!(verified["success"], false);
        assert_eq!(verified["kind"], NOT_FOUND);

        let status = router.get_status();
        assert_eq!(status["success"], true);
        assert_eq!(status["deployments"], json!([]));
    }

    #[tokio::test]
    async fn failed_pool_reports_partial_tokens() {
        let router = router(healthy().revert_submission(3), true);

        let response = router
            .dispatch_json(json!({"operation": "deploy", "chain": "ethereum"}))
            .await;
        assert_eq!(response["success"], false);
        assert_eq!(response["kind"], "deploy_error");
        let partial = response["partial"].as_object().unwrap();
        assert_eq!(partial.len(), 3);
        assert!(partial.contains_key("TokenUSDC"));
        assert!(!partial.contains_key("LiquidityPool"));

        let listed = router.get_addresses(&"ethereum".into());
        assert_eq!(listed["kind"], NOT_FOUND);
    }

    #[tokio::test]
    async fn unreachable_endpoints_are_detailed() {
        let router = router(MockConnector::new(MockBehavior::Down("refused".into())), true);

        let response = router
            .dispatch_json(json!({
                "operation": "deploy",
                "chain": "ethereum",
                "rpcUrl": "https://caller.example/"
            }))
            .await;
        assert_eq!(response["success"], false);
        assert_eq!(response["kind"], "multi_endpoint_failure");
        assert!(response.get("partial").is_none());
        let failures = response["details"]["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0]["sourceRank"], 0);
        assert_eq!(failures[1]["sourceRank"], 1);
    }

    #[tokio::test]
    async fn low_balance_names_the_wallet_to_fund() {
        let router = router(healthy().with_balance(U256::one()), true);

        let response = router
            .dispatch(Operation::Deploy(DeployParams {
                chain: "ethereum".into(),
                ..Default::default()
            }))
            .await;
        assert_eq!(response["kind"], "insufficient_balance");
        assert_eq!(response["details"]["balance"], "1");
        assert!(response["details"]["deployer"].is_string());
    }

    #[tokio::test]
    async fn key_material_in_body_is_refused() {
        let router = router(healthy(), true);

        for field in FORBIDDEN_FIELDS {
            let mut body = json!({"operation": "deploy", "chain": "ethereum"});
            body[*field] = json!(DEV_KEY);

            let response = router.dispatch_json(body).await;
            assert_eq!(response["success"], false, "{field}");
            assert_eq!(response["kind"], INVALID_REQUEST, "{field}");
            assert!(!response.to_string().contains(DEV_KEY));
        }

        // none of them reached the deployer
        let listed = router
            .dispatch_json(json!({"operation": "get_addresses", "chain": "ethereum"}))
            .await;
        assert_eq!(listed["kind"], NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_bodies_fail_softly() {
        let router = router(healthy(), true);

        for body in [
            json!("deploy"),
            json!({"operation": "selfdestruct"}),
            json!({"operation": "verify"}),
            json!({"operation": "diagnose", "chain": "  "}),
        ] {
            let response = router.dispatch_json(body.clone()).await;
            assert_eq!(response["success"], false, "{body}");
            assert_eq!(response["kind"], INVALID_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn missing_key_fails_closed_and_shows_in_diagnostics() {
        let router = router(healthy(), false);

        let deployed = router
            .dispatch_json(json!({"operation": "deploy", "chain": "ethereum"}))
            .await;
        assert_eq!(deployed["success"], false);
        assert_eq!(deployed["kind"], "config_error");

        let report = router
            .dispatch_json(json!({"operation": "diagnose", "chain": "ethereum"}))
            .await;
        assert_eq!(report["success"], true);
        assert!(report["healthScore"].as_u64().unwrap() <= 75);
        assert!(report["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r.as_str().unwrap().contains("DEPLOYER_PRIVATE_KEY")));
    }

    #[tokio::test]
    async fn health_check_lists_secret_presence() {
        let router = router(healthy(), true);

        let health = router
            .dispatch_json(json!({"operation": "health_check"}))
            .await;
        assert_eq!(health["success"], true);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["secretsConfigured"]["DEPLOYER_PRIVATE_KEY"], true);
        assert_eq!(health["secretsConfigured"]["ALCHEMY_API_KEY"], false);
    }
}
