use std::time::Duration;

use kproxy_api::IpFamily;
use serde::Deserialize;

use crate::{Error, Result};

fn default_min_sync_interval_ms() -> u64 {
    1_000
}

fn default_max_sync_interval_ms() -> u64 {
    30_000
}

fn default_burst_syncs() -> u32 {
    2
}

/// Construction-time configuration of one engine. Intervals bound how often
/// the reconciliation closure may run; see [`crate::Engine`].
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    pub family: IpFamily,

    /// Lower bound between a sync completing and the next one starting,
    /// modulo bursts.
    #[serde(default = "default_min_sync_interval_ms")]
    pub min_sync_interval_ms: u64,

    /// Upper bound between syncs; the loop self-triggers at this period.
    #[serde(default = "default_max_sync_interval_ms")]
    pub max_sync_interval_ms: u64,

    /// How many syncs may run back to back before pacing takes over.
    #[serde(default = "default_burst_syncs")]
    pub burst_syncs: u32,
}

impl EngineConfig {
    pub fn new(family: IpFamily) -> Self {
        Self {
            family,
            min_sync_interval_ms: default_min_sync_interval_ms(),
            max_sync_interval_ms: default_max_sync_interval_ms(),
            burst_syncs: default_burst_syncs(),
        }
    }

    pub fn min_sync_interval(&self) -> Duration {
        Duration::from_millis(self.min_sync_interval_ms)
    }

    pub fn max_sync_interval(&self) -> Duration {
        Duration::from_millis(self.max_sync_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sync_interval_ms < self.min_sync_interval_ms {
            return Err(Error::Config(format!(
                "max sync interval ({}ms) must be >= min sync interval ({}ms)",
                self.max_sync_interval_ms, self.min_sync_interval_ms
            )));
        }
        if self.max_sync_interval_ms == 0 {
            return Err(Error::Config("max sync interval must be non-zero".into()));
        }
        if self.burst_syncs == 0 {
            return Err(Error::Config("burst syncs must be at least 1".into()));
        }
        Ok(())
    }
}
