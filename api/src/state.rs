use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub registry: RegistryRefresh,
}

/// Staleness guard for the plugin/report registry. Registry reads must
/// reflect on-disk plugin state, but a burst of reads should not re-scan the
/// filesystem on every request; reads within the staleness window reuse the
/// last sync.
#[derive(Clone)]
pub struct RegistryRefresh {
    pub plugin_dir: PathBuf,
    staleness: Duration,
    last_refresh: Arc<Mutex<Option<Instant>>>,
}

impl RegistryRefresh {
    pub fn from_env() -> Self {
        let plugin_dir = std::env::var("STOCKTAKE_PLUGIN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/local/stocktake/plugins"));
        let staleness = std::env::var("STOCKTAKE_REGISTRY_STALENESS_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        Self::new(plugin_dir, staleness)
    }

    pub fn new(plugin_dir: PathBuf, staleness: Duration) -> Self {
        Self {
            plugin_dir,
            staleness,
            last_refresh: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns true when the caller should re-scan the plugin directory, and
    /// stamps the window so concurrent readers don't also scan.
    pub fn claim_refresh(&self) -> bool {
        let mut last = self
            .last_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *last {
            Some(at) if at.elapsed() < self.staleness => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_claimed_once_per_window() {
        let refresh = RegistryRefresh::new(PathBuf::from("/tmp"), Duration::from_secs(60));
        assert!(refresh.claim_refresh());
        assert!(!refresh.claim_refresh());
    }

    #[test]
    fn zero_staleness_always_refreshes() {
        let refresh = RegistryRefresh::new(PathBuf::from("/tmp"), Duration::from_secs(0));
        assert!(refresh.claim_refresh());
        assert!(refresh.claim_refresh());
    }
}
