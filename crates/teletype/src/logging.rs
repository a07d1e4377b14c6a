//! Logging setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CRATES: [&str; 4] = [
    "teletype",
    "teletype_hub",
    "teletype_transport",
    "teletype_protocol",
];

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` for the Teletype crates and `extra_target` (usually
/// the binary's own crate name).
///
/// Calling it again after a subscriber is installed does nothing.
///
/// ```no_run
/// teletype::init_tracing("teletype_server", "info");
/// ```
pub fn init_tracing(extra_target: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(extra_target, default_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn default_directives(extra_target: &str, level: &str) -> String {
    let mut targets: Vec<&str> = CRATES.to_vec();
    if !extra_target.is_empty() {
        targets.push(extra_target);
    }
    targets
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}
