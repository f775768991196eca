use std::sync::Arc;

use log::{debug, trace};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::checked_ttl;
use crate::config::Settings;
use crate::errors::{Attempt, ExecutionError, LockError};
use crate::node::NodeClient;
use crate::quorum;
use crate::utils::{rng_seed_now, sleep_jittered};

struct LockState {
    expiration: Instant,
    attempts: Vec<Attempt>,
    released: bool,
}

// A successfully held lock. Clones share state: the renewal task and the
// owner observe the same expiration. A handle must not be driven by two
// concurrent tasks at once.
#[derive(Clone)]
pub struct Lock {
    nodes: Vec<Arc<dyn NodeClient>>,
    resources: Arc<Vec<String>>,
    value: Arc<String>,
    settings: Settings,
    state: Arc<RwLock<LockState>>,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("resources", &self.resources)
            .field("value", &self.value)
            .finish()
    }
}

impl Lock {
    pub(crate) fn new(
        nodes: Vec<Arc<dyn NodeClient>>,
        resources: Vec<String>,
        value: String,
        expiration: Instant,
        attempts: Vec<Attempt>,
        settings: Settings,
    ) -> Lock {
        Lock {
            nodes,
            resources: Arc::new(resources),
            value: Arc::new(value),
            settings,
            state: Arc::new(RwLock::new(LockState {
                expiration,
                attempts,
                released: false,
            })),
        }
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    // The token stored on every granting server.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub async fn expiration(&self) -> Instant {
        self.state.read().await.expiration
    }

    // Remaining validity on the monotonic clock. The lock may safely be
    // assumed held only while this is non-zero.
    pub async fn remaining(&self) -> Duration {
        let expiration = self.state.read().await.expiration;
        expiration.saturating_duration_since(Instant::now())
    }

    // Fan-out history, one record per attempt, including the granting one.
    pub async fn attempts(&self) -> Vec<Attempt> {
        self.state.read().await.attempts.clone()
    }

    pub async fn is_released(&self) -> bool {
        self.state.read().await.released
    }

    // Refreshes the server-side TTL, keeping the token stable. On success
    // the shared expiration is replaced, so prior clones observe the
    // update. An expiration that does not move forward means the lock can
    // no longer be safely assumed held.
    pub async fn extend(&self, ttl: Duration) -> Result<(), LockError> {
        let ttl = checked_ttl(ttl)?;
        if self.state.read().await.released {
            return Err(LockError::Released);
        }

        let mut attempts = Vec::new();
        let mut rng = rng_seed_now();
        loop {
            let outcome =
                quorum::try_extend(&self.nodes, &self.resources, &self.value, ttl, &self.settings)
                    .await;
            match outcome.expiration {
                Some(expiration) => {
                    let mut state = self.state.write().await;
                    state.attempts.push(outcome.attempt.clone());
                    if expiration <= state.expiration {
                        attempts.push(outcome.attempt);
                        return Err(ExecutionError { attempts }.into());
                    }
                    trace!("extended {:?}, valid for {:?}", self.resources, ttl);
                    state.expiration = expiration;
                    return Ok(());
                }
                None => {
                    attempts.push(outcome.attempt);
                    if attempts.len() > self.settings.retry_count as usize {
                        debug!(
                            "extend of {:?} failed after {} attempts",
                            self.resources,
                            attempts.len()
                        );
                        return Err(ExecutionError { attempts }.into());
                    }
                    sleep_jittered(
                        self.settings.retry_delay,
                        self.settings.retry_jitter,
                        &mut rng,
                    )
                    .await;
                }
            }
        }
    }

    // Best-effort release across all servers. The handle becomes terminal
    // regardless of the vote; servers that could not be reached let the
    // TTL expire. An error is surfaced only when not a single server
    // confirmed a deletion while at least one refused or failed.
    pub async fn release(&self) -> Result<(), LockError> {
        {
            let mut state = self.state.write().await;
            if state.released {
                return Err(LockError::Released);
            }
            state.released = true;
        }

        let attempt = quorum::try_release(&self.nodes, &self.resources, &self.value).await;
        trace!(
            "released {:?}: {}/{} confirmations",
            self.resources,
            attempt.votes_for.len(),
            attempt.membership_size
        );
        let confirmed = !attempt.votes_for.is_empty();
        let refused = !attempt.votes_against.is_empty();
        self.state.write().await.attempts.push(attempt.clone());
        if !confirmed && refused {
            return Err(ExecutionError {
                attempts: vec![attempt],
            }
            .into());
        }
        Ok(())
    }
}
