use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use log::trace;
use tokio::time::{Duration, Instant};

use crate::config::Settings;
use crate::errors::{Attempt, NodeError};
use crate::node::NodeClient;
use crate::script::{Script, ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};

// Majority of the configured servers.
pub fn quorum_size(membership_size: usize) -> usize {
    membership_size / 2 + 1
}

// Outcome of one fan-out cycle. `expiration` is present only when the vote
// was quorate and the remaining validity positive.
pub(crate) struct AttemptOutcome {
    pub attempt: Attempt,
    pub expiration: Option<Instant>,
}

// Clock-drift allowance for one acquisition window.
pub(crate) fn drift(ttl: Duration, drift_factor: f64) -> Duration {
    Duration::from_millis((ttl.as_millis() as f64 * drift_factor) as u64 + 2)
}

// One acquisition attempt: fan out, tally, compute validity. A missed
// quorum or exhausted validity rolls back on every server, including the
// refusing ones, in case a write landed but its acknowledgement was lost.
pub(crate) async fn try_acquire(
    nodes: &[Arc<dyn NodeClient>],
    resources: &[String],
    value: &str,
    ttl: Duration,
    settings: &Settings,
) -> AttemptOutcome {
    let args = vec![value.to_owned(), ttl.as_millis().to_string()];
    let start = Instant::now();
    let attempt = broadcast(nodes, &ACQUIRE_SCRIPT, resources, &args).await;
    let expiration = expiration_for(start, ttl, settings, &attempt);
    if expiration.is_none() {
        trace!(
            "acquire of {:?} missed quorum: {}/{} votes",
            resources,
            attempt.votes_for.len(),
            attempt.membership_size
        );
        try_release(nodes, resources, value).await;
    }
    AttemptOutcome {
        attempt,
        expiration,
    }
}

// One extension attempt. No rollback on failure: the prior expiration
// still stands on the server side.
pub(crate) async fn try_extend(
    nodes: &[Arc<dyn NodeClient>],
    resources: &[String],
    value: &str,
    ttl: Duration,
    settings: &Settings,
) -> AttemptOutcome {
    let args = vec![value.to_owned(), ttl.as_millis().to_string()];
    let start = Instant::now();
    let attempt = broadcast(nodes, &EXTEND_SCRIPT, resources, &args).await;
    let expiration = expiration_for(start, ttl, settings, &attempt);
    if expiration.is_none() {
        trace!(
            "extend of {:?} missed quorum: {}/{} votes",
            resources,
            attempt.votes_for.len(),
            attempt.membership_size
        );
    }
    AttemptOutcome {
        attempt,
        expiration,
    }
}

// Release fan-out. No quorum requirement; the tally is kept only for
// diagnostics. Servers that could not be reached let the TTL expire.
pub(crate) async fn try_release(
    nodes: &[Arc<dyn NodeClient>],
    resources: &[String],
    value: &str,
) -> Attempt {
    let args = vec![value.to_owned()];
    broadcast(nodes, &RELEASE_SCRIPT, resources, &args).await
}

// Dispatches `script` to every node concurrently and tallies the votes.
// Waits for every reply, stragglers included: elapsed-time accounting must
// cover the slowest server or validity would be over-estimated.
async fn broadcast(
    nodes: &[Arc<dyn NodeClient>],
    script: &'static Script,
    keys: &[String],
    args: &[String],
) -> Attempt {
    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        let node = node.clone();
        let keys = keys.to_vec();
        let args = args.to_vec();
        handles.push(tokio::spawn(async move {
            let vote = node.eval_script(script, &keys, &args).await;
            (node.id().to_owned(), vote)
        }));
    }

    let membership_size = nodes.len();
    let mut attempt = Attempt {
        membership_size,
        quorum_size: quorum_size(membership_size),
        votes_for: Vec::new(),
        votes_against: BTreeMap::new(),
    };
    for result in join_all(handles).await {
        let (id, vote) = result.unwrap(); // no task should panic
        match vote {
            Ok(reply) if reply > 0 => attempt.votes_for.push(id),
            Ok(_) => {
                attempt.votes_against.insert(id, refusal(script));
            }
            Err(err) => {
                attempt.votes_against.insert(id, err);
            }
        }
    }
    attempt
}

fn refusal(script: &Script) -> NodeError {
    if script.digest == ACQUIRE_SCRIPT.digest {
        NodeError::ResourceLocked
    } else {
        NodeError::Rejected
    }
}

fn expiration_for(
    start: Instant,
    ttl: Duration,
    settings: &Settings,
    attempt: &Attempt,
) -> Option<Instant> {
    if !attempt.is_quorate() {
        return None;
    }
    let validity = ttl
        .checked_sub(start.elapsed())?
        .checked_sub(drift(ttl, settings.drift_factor))?;
    if validity.is_zero() {
        return None;
    }
    Some(start + validity)
}
