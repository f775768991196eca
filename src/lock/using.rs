use std::future::Future;
use std::sync::Arc;

use log::{debug, trace};
use tokio::select;
use tokio::sync::RwLock;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{Lock, LockManager};
use crate::config::Settings;
use crate::errors::LockError;

// Cooperative abort signal handed to the routine running under `using`.
// The routine polls `aborted` (or awaits `cancelled`) to learn that the
// lock can no longer be safely assumed held; it is never forcibly stopped.
#[derive(Clone)]
pub struct LockSignal {
    token: CancellationToken,
    error: Arc<RwLock<Option<LockError>>>,
}

impl LockSignal {
    fn new() -> LockSignal {
        LockSignal {
            token: CancellationToken::new(),
            error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    // Resolves once the lock is lost. Pending forever while renewal keeps up.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    // The renewal failure that caused the abort, if any.
    pub async fn error(&self) -> Option<LockError> {
        self.error.read().await.clone()
    }

    async fn abort(&self, err: LockError) {
        *self.error.write().await = Some(err);
        self.token.cancel();
    }
}

impl LockManager {
    // Runs `routine` under a lock on `resources`: acquires, renews the lock
    // in the background, and releases on every exit path. The routine's own
    // error wins over release diagnostics; a renewal failure is delivered
    // through the signal, never thrown into the routine.
    pub async fn using<F, Fut, T>(
        &self,
        resources: &[&str],
        ttl: Duration,
        routine: F,
    ) -> anyhow::Result<T>
    where
        F: FnOnce(LockSignal) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.using_with_settings(resources, ttl, self.settings(), routine)
            .await
    }

    pub async fn using_with_settings<F, Fut, T>(
        &self,
        resources: &[&str],
        ttl: Duration,
        settings: &Settings,
        routine: F,
    ) -> anyhow::Result<T>
    where
        F: FnOnce(LockSignal) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let lock = self.acquire_with_settings(resources, ttl, settings).await?;
        let signal = LockSignal::new();

        let stop = CancellationToken::new();
        let renewal = tokio::spawn(renew_until_stopped(
            lock.clone(),
            ttl,
            settings.automatic_extension_threshold,
            signal.clone(),
            stop.clone(),
        ));

        let result = routine(signal).await;

        // The renewal task completes before the release dispatch, so the
        // two can never race on the servers.
        stop.cancel();
        let _ = renewal.await;

        match result {
            Ok(value) => {
                lock.release().await?;
                Ok(value)
            }
            Err(err) => {
                // The routine's error wins; keep the release outcome as a
                // secondary diagnostic only.
                if let Err(release_err) = lock.release().await {
                    debug!("release after failed routine: {}", release_err);
                }
                Err(err)
            }
        }
    }
}

// Renews `lock` whenever its remaining validity shrinks to `threshold`,
// until stopped or until an extension fails. A deadline already in the
// past fires immediately.
async fn renew_until_stopped(
    lock: Lock,
    ttl: Duration,
    threshold: Duration,
    signal: LockSignal,
    stop: CancellationToken,
) {
    loop {
        let expiration = lock.expiration().await;
        let renew_at = expiration.checked_sub(threshold).unwrap_or_else(Instant::now);
        select! {
            _ = stop.cancelled() => {
                return;
            },
            _ = sleep_until(renew_at) => {
                match lock.extend(ttl).await {
                    Ok(()) => {
                        trace!("renewed {:?}", lock.resources());
                    }
                    Err(err) => {
                        debug!("renewal of {:?} failed: {}", lock.resources(), err);
                        signal.abort(err).await;
                        return;
                    }
                }
            },
        }
    }
}
