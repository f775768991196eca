//! Client-side distributed lock manager over a set of independent
//! Redis-compatible servers: quorum-voted acquisition, extension and
//! release, clock-drift-aware validity accounting, and a scoped helper
//! that renews the lock underneath a long-running routine.

pub mod config;
pub mod errors;
pub mod lock;
pub mod node;
pub mod quorum;
pub mod script;
pub mod utils;

pub use config::Settings;
pub use errors::{Attempt, ExecutionError, LockError, NodeError};
pub use lock::{Lock, LockManager, LockSignal};
pub use node::{MemoryNode, NodeClient, RedisNode};
