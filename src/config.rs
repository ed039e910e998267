use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a run decides its hosted page has settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleStrategy {
    /// Wait for the page's load report, but never longer than the settle delay.
    #[default]
    LoadEvent,
    /// Always wait the full settle delay.
    Timer,
}

/// What `run()` does while a previous run is still settling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPolicy {
    /// Coalesce into exactly one follow-up run after the current one settles.
    #[default]
    SingleFlight,
    /// Start another independent run; the last one to settle wins.
    Overlapping,
}

/// Configuration for the playground sandbox
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Upper bound between handing off a document and releasing its handle
    pub settle_delay: Duration,
    pub settle_strategy: SettleStrategy,
    pub run_policy: RunPolicy,
    /// Maximum V8 heap per hosted page in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
    /// How long a hosted page keeps running timers after it loads
    pub page_budget: Duration,
    /// Origin object URLs are minted under
    pub blob_origin: String,
    /// Allowed origins for in-page fetch() (empty = fetch disabled)
    pub allowed_origins: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            settle_strategy: SettleStrategy::default(),
            run_policy: RunPolicy::default(),
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            page_budget: Duration::from_secs(2),
            blob_origin: String::from("http://preview.localhost"),
            allowed_origins: vec![], // fetch disabled by default
        }
    }
}
