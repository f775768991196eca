use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Duration;

// A small RNG seeded from the wall clock, one per retry loop.
pub fn rng_seed_now() -> StdRng {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    StdRng::seed_from_u64(seed)
}

// Sleeps for `base` plus a uniformly random share of `jitter`.
pub async fn sleep_jittered(base: Duration, jitter: Duration, rng: &mut StdRng) {
    let mut delay = base;
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms > 0 {
        delay += Duration::from_millis(rng.gen_range(0..=jitter_ms));
    }
    tokio::time::sleep(delay).await;
}

pub fn sha1_hex(data: &[u8]) -> String {
    use sha1::Digest;
    hex::encode(sha1::Sha1::digest(data))
}

// 16 random bytes, hex encoded. Identifies one lock attempt.
pub fn random_value() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
