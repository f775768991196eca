use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use super::NodeClient;
use crate::errors::NodeError;
use crate::script::{Script, ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};

struct Entry {
    value: String,
    expires_at: Instant,
}

// A single-process lock server speaking the same script interface as a
// remote endpoint. Expirations are tracked on the monotonic clock.
pub struct MemoryNode {
    id: String,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryNode {
    pub fn new(id: impl Into<String>) -> MemoryNode {
        MemoryNode {
            id: id.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    // Current value under `key`, if it has not expired.
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    // Remaining lifetime of `key`, if it has not expired.
    pub async fn pttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .map(|e| e.expires_at.saturating_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    fn prune(entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
    }

    fn ttl_arg(args: &[String]) -> Result<Duration, NodeError> {
        let ms = args
            .get(1)
            .and_then(|a| a.parse::<u64>().ok())
            .ok_or_else(|| NodeError::Transport("malformed ttl argument".to_owned()))?;
        Ok(Duration::from_millis(ms))
    }
}

#[async_trait]
impl NodeClient for MemoryNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, NodeError> {
        let value = args
            .first()
            .ok_or_else(|| NodeError::Transport("missing value argument".to_owned()))?;

        let mut entries = self.entries.lock().await;
        Self::prune(&mut entries);

        if script.digest == ACQUIRE_SCRIPT.digest {
            for key in keys {
                if let Some(e) = entries.get(key) {
                    if e.value != *value {
                        return Ok(0);
                    }
                }
            }
            let expires_at = Instant::now() + Self::ttl_arg(args)?;
            for key in keys {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }
            Ok(1)
        } else if script.digest == EXTEND_SCRIPT.digest {
            for key in keys {
                match entries.get(key) {
                    Some(e) if e.value == *value => {}
                    _ => return Ok(0),
                }
            }
            let expires_at = Instant::now() + Self::ttl_arg(args)?;
            for key in keys {
                if let Some(e) = entries.get_mut(key) {
                    e.expires_at = expires_at;
                }
            }
            Ok(1)
        } else if script.digest == RELEASE_SCRIPT.digest {
            let mut deleted = 0;
            for key in keys {
                if entries.get(key).map(|e| &e.value) == Some(value) {
                    entries.remove(key);
                    deleted += 1;
                }
            }
            Ok(deleted)
        } else {
            Err(NodeError::Transport(format!(
                "unknown script {}",
                script.digest
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ss: &[&str]) -> Vec<String> {
        ss.iter().map(|&s| s.to_owned()).collect()
    }

    #[tokio::test]
    async fn test_acquire_conflict_and_release() {
        let node = MemoryNode::new("local");
        let ks = keys(&["a", "b"]);

        let reply = node
            .eval_script(&ACQUIRE_SCRIPT, &ks, &keys(&["tok-1", "60000"]))
            .await
            .unwrap();
        assert_eq!(reply, 1);
        assert_eq!(node.get("a").await.as_deref(), Some("tok-1"));
        assert_eq!(node.get("b").await.as_deref(), Some("tok-1"));

        // A different holder is refused; the same holder is not.
        let reply = node
            .eval_script(&ACQUIRE_SCRIPT, &ks, &keys(&["tok-2", "60000"]))
            .await
            .unwrap();
        assert_eq!(reply, 0);
        let reply = node
            .eval_script(&ACQUIRE_SCRIPT, &ks, &keys(&["tok-1", "60000"]))
            .await
            .unwrap();
        assert_eq!(reply, 1);

        // Release with the wrong value deletes nothing.
        let reply = node
            .eval_script(&RELEASE_SCRIPT, &ks, &keys(&["tok-2"]))
            .await
            .unwrap();
        assert_eq!(reply, 0);
        let reply = node
            .eval_script(&RELEASE_SCRIPT, &ks, &keys(&["tok-1"]))
            .await
            .unwrap();
        assert_eq!(reply, 2);
        assert_eq!(node.get("a").await, None);
        assert_eq!(node.get("b").await, None);
    }

    #[tokio::test]
    async fn test_extend_requires_all_keys_held() {
        let node = MemoryNode::new("local");

        let reply = node
            .eval_script(&ACQUIRE_SCRIPT, &keys(&["a"]), &keys(&["tok-1", "60000"]))
            .await
            .unwrap();
        assert_eq!(reply, 1);

        // One key missing fails the whole extend without touching "a".
        let before = node.pttl("a").await.unwrap();
        let reply = node
            .eval_script(
                &EXTEND_SCRIPT,
                &keys(&["a", "missing"]),
                &keys(&["tok-1", "120000"]),
            )
            .await
            .unwrap();
        assert_eq!(reply, 0);
        assert!(node.pttl("a").await.unwrap() <= before);

        let reply = node
            .eval_script(&EXTEND_SCRIPT, &keys(&["a"]), &keys(&["tok-1", "120000"]))
            .await
            .unwrap();
        assert_eq!(reply, 1);
        assert!(node.pttl("a").await.unwrap() > Duration::from_millis(60000));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let node = MemoryNode::new("local");

        let reply = node
            .eval_script(&ACQUIRE_SCRIPT, &keys(&["a"]), &keys(&["tok-1", "50"]))
            .await
            .unwrap();
        assert_eq!(reply, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(node.get("a").await, None);

        // The slot is free for another holder.
        let reply = node
            .eval_script(&ACQUIRE_SCRIPT, &keys(&["a"]), &keys(&["tok-2", "50"]))
            .await
            .unwrap();
        assert_eq!(reply, 1);
    }
}
