use std::time::Duration;

/// Exponential backoff for live-feed resynchronization.
///
/// The feed task pulls the next delay whenever the subscription falls
/// behind and resets once deliveries flow again, so one slow consumer does
/// not hammer the store with reload queries.
#[derive(Debug, Clone)]
pub struct ResyncBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    attempt: u32,
}

impl ResyncBackoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms: base_delay_ms.max(1),
            max_delay_ms: max_delay_ms.max(1),
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next resync, doubling per consecutive attempt up
    /// to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(20);
        let calculated = self.base_delay_ms.saturating_mul(1_u64 << shift);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// Forget accumulated attempts after a healthy delivery.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ResyncBackoff {
    fn default() -> Self {
        Self::new(250, 15_000)
    }
}
