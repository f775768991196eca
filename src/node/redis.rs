use async_trait::async_trait;
use log::trace;
use redis::aio::ConnectionManager;
use redis::{Client, ErrorKind, IntoConnectionInfo, RedisResult};

use super::NodeClient;
use crate::errors::NodeError;
use crate::script::Script;

// A Redis endpoint reached through a multiplexed, auto-reconnecting
// connection. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct RedisNode {
    id: String,
    conn: ConnectionManager,
}

impl RedisNode {
    pub async fn connect<T: IntoConnectionInfo>(params: T) -> anyhow::Result<RedisNode> {
        let info = params.into_connection_info()?;
        let id = info.addr.to_string();
        let conn = ConnectionManager::new(Client::open(info)?).await?;
        Ok(RedisNode { id, conn })
    }

    async fn eval_by_digest(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(&script.digest).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query_async(&mut conn).await
    }

    async fn load(&self, script: &Script) -> RedisResult<String> {
        let mut conn = self.conn.clone();
        redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(script.source)
            .query_async(&mut conn)
            .await
    }
}

#[async_trait]
impl NodeClient for RedisNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, NodeError> {
        match self.eval_by_digest(script, keys, args).await {
            Ok(reply) => Ok(reply),
            Err(err) if err.kind() == ErrorKind::NoScriptError => {
                // The digest is not cached on this endpoint yet. Load the
                // source and retry once.
                trace!("loading script {} on {}", script.digest, self.id);
                self.load(script)
                    .await
                    .map_err(|e| NodeError::Transport(e.to_string()))?;
                self.eval_by_digest(script, keys, args)
                    .await
                    .map_err(|e| NodeError::Transport(e.to_string()))
            }
            Err(err) => Err(NodeError::Transport(err.to_string())),
        }
    }
}
