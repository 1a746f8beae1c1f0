// Rotating API key pool for the AI analysis collaborator
//
// Keys that fail repeatedly are put on a cooldown and skipped until it
// expires; requests rotate round-robin over the remaining keys.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const COOLDOWN_AFTER_FAILURES: u32 = 3;
const COOLDOWN: Duration = Duration::from_secs(60);

struct PoolKey {
    key: String,
    consecutive_failures: u32,
    cooling_until: Option<Instant>,
}

impl PoolKey {
    fn available(&self) -> bool {
        match self.cooling_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }
}

/// Round-robin key pool with per-key failure cooldown
pub struct ApiKeyPool {
    keys: RwLock<Vec<PoolKey>>,
    cursor: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: RwLock::new(
                keys.into_iter()
                    .map(|key| PoolKey {
                        key,
                        consecutive_failures: 0,
                        cooling_until: None,
                    })
                    .collect(),
            ),
            cursor: AtomicUsize::new(0),
        }
    }

    pub async fn total_keys(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Next available key, rotating round-robin; None when every key is
    /// cooling down or the pool is empty
    pub async fn acquire(&self) -> Option<(usize, String)> {
        let keys = self.keys.read().await;
        if keys.is_empty() {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..keys.len() {
            let index = (start + offset) % keys.len();
            if keys[index].available() {
                return Some((index, keys[index].key.clone()));
            }
        }
        None
    }

    pub async fn report_success(&self, index: usize) {
        let mut keys = self.keys.write().await;
        if let Some(entry) = keys.get_mut(index) {
            if entry.consecutive_failures > 0 {
                debug!("API key {} recovered", index);
            }
            entry.consecutive_failures = 0;
            entry.cooling_until = None;
        }
    }

    pub async fn report_failure(&self, index: usize) {
        let mut keys = self.keys.write().await;
        if let Some(entry) = keys.get_mut(index) {
            entry.consecutive_failures += 1;
            if entry.consecutive_failures >= COOLDOWN_AFTER_FAILURES {
                entry.cooling_until = Some(Instant::now() + COOLDOWN);
                warn!(
                    "API key {} cooling down for {}s ({} consecutive failures)",
                    index,
                    COOLDOWN.as_secs(),
                    entry.consecutive_failures
                );
            }
        }
    }
}
