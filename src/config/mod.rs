use tokio::time::Duration;

pub const DEFAULT_DRIFT_FACTOR: f64 = 0.01;
pub const DEFAULT_RETRY_COUNT: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(200);
pub const DEFAULT_AUTOMATIC_EXTENSION_THRESHOLD: Duration = Duration::from_millis(500);

// Tuning knobs for lock acquisition and renewal. Process-wide defaults live
// on the manager; every operation accepts a per-call override.
#[derive(Debug, Clone)]
pub struct Settings {
    // Multiplier applied to the requested TTL when budgeting clock drift.
    pub drift_factor: f64,
    // Maximum additional attempts after the first.
    pub retry_count: u32,
    // Base inter-attempt delay.
    pub retry_delay: Duration,
    // Upper bound of the uniform random jitter added to each delay.
    pub retry_jitter: Duration,
    // Minimum margin before expiration at which renewal is scheduled.
    pub automatic_extension_threshold: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            drift_factor: DEFAULT_DRIFT_FACTOR,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_jitter: DEFAULT_RETRY_JITTER,
            automatic_extension_threshold: DEFAULT_AUTOMATIC_EXTENSION_THRESHOLD,
        }
    }
}
