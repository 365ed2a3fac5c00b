use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);

/// What to do after one HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Transient server error with budget left; sleep and re-send the same payload.
    Retry,
    /// Transient server error with no budget left.
    Exhausted,
    Fatal,
}

/// Bounded retry with a fixed backoff. Only HTTP 500 is treated as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Classify the response of attempt number `attempt` (1-based).
    pub fn classify(&self, status: u16, attempt: u32) -> AttemptOutcome {
        match status {
            200 => AttemptOutcome::Success,
            500 if attempt < self.max_attempts() => AttemptOutcome::Retry,
            500 => AttemptOutcome::Exhausted,
            _ => AttemptOutcome::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttemptOutcome, RetryPolicy};
    use std::time::Duration;

    #[test]
    fn default_policy_allows_three_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), Duration::from_secs(3));
        assert_eq!(policy.classify(500, 1), AttemptOutcome::Retry);
        assert_eq!(policy.classify(500, 2), AttemptOutcome::Retry);
        assert_eq!(policy.classify(500, 3), AttemptOutcome::Exhausted);
    }

    #[test]
    fn only_500_is_retryable() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify(200, 1), AttemptOutcome::Success);
        assert_eq!(policy.classify(200, 3), AttemptOutcome::Success);
        for status in [201, 400, 401, 403, 404, 502, 503] {
            assert_eq!(policy.classify(status, 1), AttemptOutcome::Fatal, "{status}");
        }
    }

    #[test]
    fn zero_retries_fails_on_first_server_error() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.classify(500, 1), AttemptOutcome::Exhausted);
    }
}
