use opentelemetry::{global::meter, metrics::Counter, KeyValue};

#[derive(Clone)]
pub struct Metrics {
    operations: Counter<u64>,
    deployments: Counter<u64>,
}

impl Metrics {
    pub fn init() -> Self {
        let m = meter("provision metrics");
        let operations = m.u64_counter("operations").init();
        let deployments = m.u64_counter("deployments").init();

        Self {
            operations,
            deployments,
        }
    }

    pub fn inc_operations(&self, operation: &'static str, success: bool) {
        self.operations.add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("success", success),
            ],
        )
    }

    /// `outcome` is `"ok"` or the failure kind.
    pub fn inc_deployments(&self, chain: &str, outcome: &'static str) {
        self.deployments.add(
            1,
            &[
                KeyValue::new("chain", chain.to_string()),
                KeyValue::new("outcome", outcome),
            ],
        )
    }
}
