use std::time::Duration;

use rand::Rng;

/// Bounded retry schedule for search requests. Each delay is 1.5x the
/// previous one, jittered by `random_factor`, until `max_attempts` have been
/// made.
pub struct RandomizedExponentialBackoff {
    max_delay: Duration,
    delay: Duration,
    random_factor: f64,
    attempts: usize,
    max_attempts: usize,
}

const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_RANDOM_FACTOR: f64 = 0.2;

impl RandomizedExponentialBackoff {
    pub fn new(
        min_delay: Duration,
        max_delay: Duration,
        random_factor: f64,
        max_attempts: usize,
    ) -> Self {
        Self {
            max_delay,
            delay: min_delay,
            random_factor,
            attempts: 1,
            max_attempts,
        }
    }

    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self::new(
            DEFAULT_MIN_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_RANDOM_FACTOR,
            max_attempts,
        )
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once attempts are used up.
    pub fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;

        let random_delay = (self.delay.as_millis() as f64 * self.random_factor) as i64;
        let jitter = if random_delay > 0 {
            rand::thread_rng().gen_range(-random_delay..=random_delay)
        } else {
            0
        };
        let dur = Duration::from_millis((self.delay.as_millis() as i64 + jitter).max(0) as u64);

        self.delay = self.delay * 3 / 2;
        if self.delay > self.max_delay {
            self.delay = self.max_delay;
        }

        Some(dur)
    }

    /// Sleeps before the next attempt, never for less than `at_least`.
    /// Returns `false` when no attempts remain.
    pub async fn wait(&mut self, at_least: Option<Duration>) -> bool {
        match self.next() {
            Some(dur) => {
                tokio::time::sleep(dur.max(at_least.unwrap_or_default())).await;
                true
            }
            None => false,
        }
    }
}
