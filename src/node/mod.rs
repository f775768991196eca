mod memory;
mod redis;

use async_trait::async_trait;

use crate::errors::NodeError;
use crate::script::Script;

pub use self::memory::MemoryNode;
pub use self::redis::RedisNode;

// A single Redis-compatible endpoint able to run a cached script.
#[async_trait]
pub trait NodeClient: Send + Sync {
    // Stable identity of the endpoint, used in vote maps.
    fn id(&self) -> &str;

    // Runs `script` against this endpoint. Integer replies map to votes:
    // zero is a refusal, anything positive a grant.
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, NodeError>;
}
