use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use prometheus::{
    labels, opts, register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    Encoder, IntCounterVec, IntGaugeVec, Registry,
};

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", super::NAMESPACE, $name)
    };
}

/// Metrics shared by the explorer agents
pub struct CoreMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    agent_name: String,

    ingress_dropped: IntCounterVec,
    vaas_persisted: IntCounterVec,
    missing_vaas_fetched: IntCounterVec,
    orphaned_messages: IntCounterVec,
    watcher_cursor: IntGaugeVec,
    invalid_amounts: IntCounterVec,
    guardian_set_index: IntGaugeVec,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    ///
    /// - `for_agent` name of the agent these metrics are tracking.
    /// - `registry` prometheus registry to attach the metrics to
    pub fn new(for_agent: &str, registry: Registry) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("baselib_version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let ingress_dropped = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("ingress_dropped_total"),
                "Gossip messages dropped before persistence",
                const_labels_ref
            ),
            &["reason"],
            registry
        )?;

        let vaas_persisted = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("vaas_persisted_total"),
                "Messages stored for the first time",
                const_labels_ref
            ),
            &["emitter_chain"],
            registry
        )?;

        let missing_vaas_fetched = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("missing_vaas_fetched_total"),
                "Missing messages backfilled from a peer guardian",
                const_labels_ref
            ),
            &["emitter_chain"],
            registry
        )?;

        let orphaned_messages = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("orphaned_messages_total"),
                "Observed chain messages dropped before confirmation",
                const_labels_ref
            ),
            &["chain", "reason"],
            registry
        )?;

        let watcher_cursor = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("watcher_cursor"),
                "Latest block height or event index processed by a watcher",
                const_labels_ref
            ),
            &["chain"],
            registry
        )?;

        let invalid_amounts = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("invalid_amounts_total"),
                "Transfer amounts that could not be parsed",
                const_labels_ref
            ),
            &[],
            registry
        )?;

        let guardian_set_index = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("guardian_set_index"),
                "Index of the current guardian set",
                const_labels_ref
            ),
            &[],
            registry
        )?;

        Ok(Self {
            agent_name: for_agent.into(),
            registry,
            ingress_dropped,
            vaas_persisted,
            missing_vaas_fetched,
            orphaned_messages,
            watcher_cursor,
            invalid_amounts,
            guardian_set_index,
        })
    }

    /// Gossip messages dropped before persistence.
    ///
    /// Labels:
    /// - `reason`: `malformed_vaa`, `unknown_guardian_set`, `no_quorum`,
    ///   `bad_signature`, `queue_full`, `bad_observation`, `bad_heartbeat`.
    pub fn ingress_dropped(&self) -> IntCounterVec {
        self.ingress_dropped.clone()
    }

    /// Messages stored for the first time.
    ///
    /// Labels:
    /// - `emitter_chain`: Chain id of the emitter.
    pub fn vaas_persisted(&self) -> IntCounterVec {
        self.vaas_persisted.clone()
    }

    /// Missing messages backfilled from a peer guardian.
    ///
    /// Labels:
    /// - `emitter_chain`: Chain id of the emitter.
    pub fn missing_vaas_fetched(&self) -> IntCounterVec {
        self.missing_vaas_fetched.clone()
    }

    /// Chain messages dropped by a watcher before they were confirmed.
    ///
    /// Labels:
    /// - `chain`: Name of the watched chain.
    /// - `reason`: `blockhash_mismatch`, `receipt_missing`, `reverted`,
    ///   `timeout` or `not_in_main_chain`.
    pub fn orphaned_messages(&self) -> IntCounterVec {
        self.orphaned_messages.clone()
    }

    /// Latest block height (EVM) or event index processed by a watcher.
    ///
    /// Labels:
    /// - `chain`: Name of the watched chain.
    pub fn watcher_cursor(&self) -> IntGaugeVec {
        self.watcher_cursor.clone()
    }

    /// Transfer amounts skipped by the statistics aggregator.
    pub fn invalid_amounts(&self) -> IntCounterVec {
        self.invalid_amounts.clone()
    }

    /// Index of the current guardian set.
    pub fn guardian_set_index(&self) -> IntGaugeVec {
        self.guardian_set_index.clone()
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format)
    /// report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CoreMetrics {{ agent_name: {} }}", self.agent_name)
    }
}
