use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff with a cap and up to 25% jitter, so a
/// fleet of dropped clients does not stampede the server in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_ms: u64,
    cap_ms: u64,
}

impl Backoff {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            base_ms: base_ms.max(1),
            cap_ms: cap_ms.max(1),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let raw = self.base_ms.saturating_mul(1 << shift).min(self.cap_ms);
        let jitter = rand::rng().random_range(0..=raw / 4);
        Duration::from_millis(raw.saturating_add(jitter).min(self.cap_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(500, 30_000)
    }
}
