use log::warn;
use std::fmt::Display;
use std::time::Duration;

/// Bounded retry with exponential backoff for flaky bus reads
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(1),
        }
    }

    /// Delay before retry number `retry` (1-based): base * 1.5^(retry-1), capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1.5f64.powi(retry.saturating_sub(1) as i32);
        Duration::from_secs_f64((self.base_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64()))
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the attempt number, starting at 0, so it can reset the
    /// device before each retry. The last error is returned.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.attempts {
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        target: "mpu6050",
                        "{} failed ({}), retry {}/{} in {:.0} ms",
                        what,
                        e,
                        attempt,
                        self.attempts - 1,
                        delay.as_secs_f64() * 1000.0
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}
