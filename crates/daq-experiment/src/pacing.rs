//! Constant-period pacing for timed steps.

use tokio::time::{sleep_until, Duration, Instant};

/// Sleeps so that consecutive timed steps start `interval` apart, measured
/// from the previous wake-up rather than from the end of the previous step.
///
/// The first call never sleeps; it only records the wake-up time.
#[derive(Debug, Default)]
pub struct Pacer {
    last_wake: Option<Instant>,
}

impl Pacer {
    /// Pacer with no previous wake-up.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait out the rest of `interval` since the last wake-up and record a new one.
    ///
    /// Returns how long it slept.
    pub async fn wait(&mut self, interval: Duration) -> Duration {
        let slept = match self.last_wake {
            None => Duration::ZERO,
            Some(last) => {
                let deadline = last + interval;
                let now = Instant::now();
                if deadline > now {
                    sleep_until(deadline).await;
                    deadline - now
                } else {
                    Duration::ZERO
                }
            }
        };
        self.last_wake = Some(Instant::now());
        slept
    }

    /// Last recorded wake-up.
    pub fn last_wake(&self) -> Option<Instant> {
        self.last_wake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_first_wait_is_skipped() {
        let mut pacer = Pacer::new();
        let start = Instant::now();
        assert_eq!(pacer.wait(Duration::from_secs(5)).await, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(pacer.last_wake().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_time_is_subtracted() {
        let mut pacer = Pacer::new();
        pacer.wait(Duration::ZERO).await;
        sleep(Duration::from_millis(50)).await;

        let slept = pacer.wait(Duration::from_millis(200)).await;
        assert_eq!(slept, Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_step_does_not_sleep() {
        let mut pacer = Pacer::new();
        pacer.wait(Duration::ZERO).await;
        sleep(Duration::from_millis(300)).await;

        assert_eq!(pacer.wait(Duration::from_millis(200)).await, Duration::ZERO);
        let before = Instant::now();
        // period restarts from the late wake-up
        sleep(Duration::from_millis(20)).await;
        assert_eq!(pacer.wait(Duration::from_millis(200)).await, Duration::from_millis(180));
        assert_eq!(before.elapsed(), Duration::from_millis(200));
    }
}
