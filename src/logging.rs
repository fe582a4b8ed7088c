//! Ambient logging setup.
//!
//! Every processor logs under two `tracing` targets rather than one:
//!
//! - `procweave::proc::<type>::<name>` for lifecycle/control-flow events
//!   (start, stop, abort, handler failures).
//! - `procweave::doc::<type>::<name>` for per-document traffic (enqueue,
//!   dispatch, drop-on-backpressure).
//!
//! Splitting them lets a consumer enable verbose per-document tracing for one
//! processor without drowning in it for the whole graph, by filtering on
//! target prefix (e.g. `RUST_LOG=procweave::doc::tweet_extractor::tweets=trace`).

/// Installs a `tracing-subscriber` formatter reading `RUST_LOG` (or
/// `procweave=info` if unset). Safe to call more than once; only the first
/// call wins.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("procweave=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

pub(crate) fn proc_target(type_name: &str, name: &str) -> String {
    format!("procweave::proc::{type_name}::{name}")
}

pub(crate) fn doc_target(type_name: &str, name: &str) -> String {
    format!("procweave::doc::{type_name}::{name}")
}
