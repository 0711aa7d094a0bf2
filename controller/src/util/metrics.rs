//! Prometheus metrics for the control-plane core, served over `/metrics` by
//! the bare `hyper` server in [`crate::server`].

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

pub struct ControllerMetrics {
    pub registry: Registry,

    /// Total reconciles per resource kind, labelled `(kind,)`.
    pub reconcile_counter: IntCounterVec,

    /// §4.6 `DecisionsPerformedTotal`, labelled `(decision, reason, consolidation_type)`.
    pub decisions_total: IntCounterVec,

    /// Command executions that rolled back, labelled `(reason,)`.
    pub command_failures_total: IntCounterVec,

    /// Reconcile wall-clock time, labelled `(kind, action)`.
    pub reconcile_duration: HistogramVec,

    /// Command execution wall-clock time from `StartCommand` to terminal state.
    pub command_duration: HistogramVec,
}

impl ControllerMetrics {
    pub fn new(namespace: &str) -> Self {
        let registry = Registry::new_custom(Some(namespace.to_string()), None)
            .expect("valid metrics namespace");

        let reconcile_counter = IntCounterVec::new(
            Opts::new(
                "reconcile_total",
                "Total number of reconciles performed, by resource kind.",
            ),
            &["kind"],
        )
        .expect("build reconcile_total");

        let decisions_total = IntCounterVec::new(
            Opts::new(
                "decisions_performed_total",
                "Disruption decisions performed, by decision kind, reason, and consolidation type.",
            ),
            &["decision", "reason", "consolidation_type"],
        )
        .expect("build decisions_performed_total");

        let command_failures_total = IntCounterVec::new(
            Opts::new(
                "command_failures_total",
                "Disruption commands that rolled back, by reason.",
            ),
            &["reason"],
        )
        .expect("build command_failures_total");

        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "reconcile_duration_seconds",
                "Reconcile duration in seconds, by resource kind and action.",
            ),
            &["kind", "action"],
        )
        .expect("build reconcile_duration_seconds");

        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "command_duration_seconds",
                "Disruption command execution duration in seconds, by method.",
            ),
            &["method"],
        )
        .expect("build command_duration_seconds");

        registry
            .register(Box::new(reconcile_counter.clone()))
            .expect("register reconcile_total");
        registry
            .register(Box::new(decisions_total.clone()))
            .expect("register decisions_performed_total");
        registry
            .register(Box::new(command_failures_total.clone()))
            .expect("register command_failures_total");
        registry
            .register(Box::new(reconcile_duration.clone()))
            .expect("register reconcile_duration_seconds");
        registry
            .register(Box::new(command_duration.clone()))
            .expect("register command_duration_seconds");

        Self {
            registry,
            reconcile_counter,
            decisions_total,
            command_failures_total,
            reconcile_duration,
            command_duration,
        }
    }

    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .expect("encode metrics");
        String::from_utf8(buffer).expect("metrics are valid utf8")
    }
}
