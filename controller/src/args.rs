use clap::Parser;

/// Startup configuration for the control-plane binary (§10.3), following the
/// teacher's `#[arg(long, env = "...", default_value...)]` idiom.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ControllerArgs {
    /// Namespace the leader-election lease lives in.
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Requeue interval, in seconds, for steady-state reconciles.
    #[arg(long, env = "PROBE_INTERVAL", default_value_t = 30)]
    pub probe_interval: u64,

    /// Port the `/metrics` and `/healthz` HTTP server listens on.
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Time budget, in seconds, for the multi-node consolidation binary search.
    #[arg(long, env = "MULTI_NODE_CONSOLIDATION_TIMEOUT", default_value_t = 60)]
    pub multi_node_consolidation_timeout: u64,

    /// How long, in seconds, the Command Queue waits for replacements to become `Initialized`.
    #[arg(long, env = "REPLACEMENT_READY_TIMEOUT", default_value_t = 600)]
    pub replacement_ready_timeout: u64,
}
