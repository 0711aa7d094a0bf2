//! Ambient process helpers shared by the control-plane binary: readiness
//! signalling, colored console output setup, and graceful shutdown.

pub mod shutdown;

/// Writes the readiness file the container's readiness probe polls for.
pub fn signal_ready() {
    std::fs::write("/etc/ready", "ready").expect("failed to write readiness file");
}

/// Initializes process-wide ambient state: color output (disabled via
/// `DISABLE_COLORS=1`, matching the operator's other binaries).
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}
