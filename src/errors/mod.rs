use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

// Per-server outcome of one scripted call. Collected into attempt records
// during a fan-out, never raised on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[non_exhaustive]
pub enum NodeError {
    // The server refused ACQUIRE because a key is held under another value.
    #[error("Resource is locked by another holder")]
    ResourceLocked,

    // The server voted against EXTEND or RELEASE.
    #[error("Request rejected by server")]
    Rejected,

    // Connection closed, timeout, protocol error. Text carried verbatim
    // from the underlying client.
    #[error("Transport failure: {0}")]
    Transport(String),
}

// One full fan-out-and-tally cycle across all servers.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub membership_size: usize,
    pub quorum_size: usize,
    // IDs of the servers that granted the operation.
    pub votes_for: Vec<String>,
    // Refusals and transport failures, by server ID.
    pub votes_against: BTreeMap<String, NodeError>,
}

impl Attempt {
    pub fn is_quorate(&self) -> bool {
        self.votes_for.len() >= self.quorum_size
    }
}

// Raised once the retry budget is exhausted. Carries every attempt in order.
#[derive(Debug, Clone, Error)]
#[error("Lock operation failed after {} attempts", .attempts.len())]
pub struct ExecutionError {
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum LockError {
    #[error("Invalid arguments specified: {0}")]
    InvalidArgument(&'static str),

    // Operation on a handle that has already been released.
    #[error("Lock has already been released")]
    Released,

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attempt() -> Attempt {
        let mut votes_against = BTreeMap::new();
        votes_against.insert("node-2".to_owned(), NodeError::ResourceLocked);
        votes_against.insert(
            "node-3".to_owned(),
            NodeError::Transport("Connection refused".to_owned()),
        );
        Attempt {
            membership_size: 3,
            quorum_size: 2,
            votes_for: vec!["node-1".to_owned()],
            votes_against,
        }
    }

    #[test]
    fn test_is_quorate() {
        let mut attempt = sample_attempt();
        assert!(!attempt.is_quorate());
        attempt.votes_for.push("node-2".to_owned());
        assert!(attempt.is_quorate());
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError {
            attempts: vec![sample_attempt(), sample_attempt()],
        };
        assert_eq!(err.to_string(), "Lock operation failed after 2 attempts");
    }

    #[test]
    fn test_attempt_serialize() {
        let json = serde_json::to_value(sample_attempt()).unwrap();
        assert_eq!(json["membership_size"], 3);
        assert_eq!(json["votes_for"][0], "node-1");
        assert_eq!(json["votes_against"]["node-2"], "ResourceLocked");
        assert_eq!(
            json["votes_against"]["node-3"]["Transport"],
            "Connection refused"
        );
    }
}
