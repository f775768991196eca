mod handle;
mod using;

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, trace};
use tokio::time::Duration;

use crate::config::Settings;
use crate::errors::{ExecutionError, LockError};
use crate::node::NodeClient;
use crate::quorum;
use crate::utils::{random_value, rng_seed_now, sleep_jittered};

pub use handle::Lock;
pub use using::LockSignal;

// Client-side lock manager over a set of independent servers. The server
// list and default settings are read-only after construction.
pub struct LockManager {
    nodes: Vec<Arc<dyn NodeClient>>,
    settings: Settings,
}

impl LockManager {
    pub fn new(nodes: Vec<Arc<dyn NodeClient>>) -> LockManager {
        Self::with_settings(nodes, Settings::default())
    }

    pub fn with_settings(nodes: Vec<Arc<dyn NodeClient>>, settings: Settings) -> LockManager {
        LockManager { nodes, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // Acquires a lock on `resources` for `ttl`, retrying with jittered
    // backoff until the retry budget is exhausted.
    pub async fn acquire(&self, resources: &[&str], ttl: Duration) -> Result<Lock, LockError> {
        self.acquire_with_settings(resources, ttl, &self.settings)
            .await
    }

    pub async fn acquire_with_settings(
        &self,
        resources: &[&str],
        ttl: Duration,
        settings: &Settings,
    ) -> Result<Lock, LockError> {
        let resources = checked_resources(resources)?;
        let ttl = checked_ttl(ttl)?;

        let mut attempts = Vec::new();
        let mut rng = rng_seed_now();
        loop {
            // A fresh token per attempt: a stale write from an earlier
            // attempt must never count as this attempt's grant.
            let value = random_value();
            let outcome =
                quorum::try_acquire(&self.nodes, &resources, &value, ttl, settings).await;
            attempts.push(outcome.attempt);
            match outcome.expiration {
                Some(expiration) => {
                    trace!("acquired {:?}, valid for {:?}", resources, ttl);
                    return Ok(Lock::new(
                        self.nodes.clone(),
                        resources,
                        value,
                        expiration,
                        attempts,
                        settings.clone(),
                    ));
                }
                None => {
                    if attempts.len() > settings.retry_count as usize {
                        debug!(
                            "acquire of {:?} failed after {} attempts",
                            resources,
                            attempts.len()
                        );
                        return Err(ExecutionError { attempts }.into());
                    }
                    sleep_jittered(settings.retry_delay, settings.retry_jitter, &mut rng).await;
                }
            }
        }
    }
}

// Deduplicates while preserving order; empty sets and empty keys are
// rejected before any network I/O.
fn checked_resources(resources: &[&str]) -> Result<Vec<String>, LockError> {
    if resources.is_empty() {
        return Err(LockError::InvalidArgument("no resources given"));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(resources.len());
    for &resource in resources {
        if resource.is_empty() {
            return Err(LockError::InvalidArgument("empty resource key"));
        }
        if seen.insert(resource) {
            out.push(resource.to_owned());
        }
    }
    Ok(out)
}

// The wire TTL is integral milliseconds; anything shorter is unrepresentable.
fn checked_ttl(ttl: Duration) -> Result<Duration, LockError> {
    if ttl < Duration::from_millis(1) {
        return Err(LockError::InvalidArgument(
            "ttl must be at least one millisecond",
        ));
    }
    Ok(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_resources() {
        assert!(matches!(
            checked_resources(&[]),
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            checked_resources(&["a", ""]),
            Err(LockError::InvalidArgument(_))
        ));

        let deduped = checked_resources(&["a", "b", "a"]).unwrap();
        assert_eq!(deduped, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_checked_ttl() {
        assert!(matches!(
            checked_ttl(Duration::ZERO),
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            checked_ttl(Duration::from_micros(500)),
            Err(LockError::InvalidArgument(_))
        ));
        assert_eq!(
            checked_ttl(Duration::from_millis(1)).unwrap(),
            Duration::from_millis(1)
        );
    }
}
