use std::time::Duration;

use backon::BackoffBuilder;

/// Fixed attempt budget with linear backoff: the wait after attempt `n`
/// is `n * backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            backoff: self.backoff,
            next: 1,
            max_attempts: self.max_attempts,
        }
    }
}

/// Yields `max_attempts - 1` delays of `backoff`, `2 * backoff`, ...
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    backoff: Duration,
    next: u32,
    max_attempts: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next >= self.max_attempts {
            return None;
        }
        let delay = self.backoff * self.next;
        self.next += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let delays: Vec<_> = RetryPolicy::new(3, Duration::from_millis(500))
            .build()
            .collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[test]
    fn test_at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.build().count(), 0);
    }
}
