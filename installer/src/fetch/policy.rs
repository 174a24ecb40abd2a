//! Retry timing and response classification.
//!
//! The two concerns are independent values: [`BackoffSchedule`] decides how
//! long to wait after a failed attempt, [`ResponseClassifier`] decides whether
//! an attempt failed at all and whether it looked like server-side
//! throttling.

use std::time::Duration;

/// Default number of attempts per fetch.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Delay after the first failed attempt; doubled for each later attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Extra pause taken when the server signals throttling (500 or 503).
pub const THROTTLE_PAUSE: Duration = Duration::from_secs(4);

/// Deterministic exponential backoff without jitter.
///
/// # Examples
///
/// ```
/// use chronicle_installer::fetch::policy::BackoffSchedule;
/// use std::time::Duration;
///
/// let schedule = BackoffSchedule::default();
/// assert_eq!(schedule.attempts(), 5);
/// assert_eq!(schedule.delay_for(3), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base: Duration,
    attempts: u32,
}

impl BackoffSchedule {
    /// Creates a schedule of `attempts` tries starting at `base`.
    ///
    /// A zero attempt count is raised to one; a fetch always sends at least
    /// one request.
    #[must_use]
    pub fn new(base: Duration, attempts: u32) -> Self {
        Self {
            base,
            attempts: attempts.max(1),
        }
    }

    /// Returns the total number of attempts, including the first.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the initial delay.
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Returns the delay after the failed `attempt` (1-based).
    ///
    /// The delay is `base * 2^(attempt - 1)`, saturating at
    /// [`Duration::MAX`].
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Returns the delay for every attempt in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        (1..=self.attempts).map(|n| self.delay_for(n)).collect()
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_ATTEMPTS)
    }
}

/// The classification of one HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// `200 OK`.
    Success,
    /// A failure worth retrying.
    RetryableFailure {
        /// Whether the status signalled server-side throttling.
        throttled: bool,
    },
    /// A non-success status that retrying will not change.
    ///
    /// Returned to the caller straight away.
    FatalFailure,
}

impl StatusClass {
    /// Returns true when another attempt should be made.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableFailure { .. })
    }
}

/// Maps status codes to [`StatusClass`] and throttling pauses.
///
/// # Examples
///
/// ```
/// use chronicle_installer::fetch::policy::{ResponseClassifier, StatusClass};
///
/// let classifier = ResponseClassifier::default();
/// assert_eq!(classifier.classify(200), StatusClass::Success);
/// assert_eq!(
///     classifier.classify(503),
///     StatusClass::RetryableFailure { throttled: true }
/// );
/// assert_eq!(classifier.classify(302), StatusClass::FatalFailure);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseClassifier {
    throttle_pause: Duration,
}

impl ResponseClassifier {
    /// Creates a classifier that pauses for `throttle_pause` on 500/503.
    #[must_use]
    pub fn new(throttle_pause: Duration) -> Self {
        Self { throttle_pause }
    }

    /// Classifies `status`.
    ///
    /// 500 and 503 are throttling signals. Any other status above 400 is
    /// retried the same way. Remaining non-200 statuses (redirects, 400,
    /// other 2xx) are handed back unretried.
    #[must_use]
    pub fn classify(&self, status: u16) -> StatusClass {
        match status {
            200 => StatusClass::Success,
            500 | 503 => StatusClass::RetryableFailure { throttled: true },
            s if s > 400 => StatusClass::RetryableFailure { throttled: false },
            _ => StatusClass::FatalFailure,
        }
    }

    /// Returns the pause taken before the backoff delay for `class`.
    #[must_use]
    pub fn pause_for(&self, class: StatusClass) -> Duration {
        match class {
            StatusClass::RetryableFailure { throttled: true } => self.throttle_pause,
            _ => Duration::ZERO,
        }
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(THROTTLE_PAUSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_schedule_doubles_from_two_hundred_millis() {
        let delays = BackoffSchedule::default().delays();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
                Duration::from_millis(3200),
            ]
        );
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        let schedule = BackoffSchedule::new(DEFAULT_BASE_DELAY, 0);
        assert_eq!(schedule.attempts(), 1);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_for(200), Duration::MAX);
    }

    #[rstest]
    #[case::ok(200, StatusClass::Success)]
    #[case::internal_error(500, StatusClass::RetryableFailure { throttled: true })]
    #[case::unavailable(503, StatusClass::RetryableFailure { throttled: true })]
    #[case::forbidden(403, StatusClass::RetryableFailure { throttled: false })]
    #[case::not_found(404, StatusClass::RetryableFailure { throttled: false })]
    #[case::bad_gateway(502, StatusClass::RetryableFailure { throttled: false })]
    #[case::bad_request(400, StatusClass::FatalFailure)]
    #[case::redirect(302, StatusClass::FatalFailure)]
    #[case::no_content(204, StatusClass::FatalFailure)]
    fn classifies_status_codes(#[case] status: u16, #[case] expected: StatusClass) {
        assert_eq!(ResponseClassifier::default().classify(status), expected);
    }

    #[test]
    fn only_throttling_adds_a_pause() {
        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.pause_for(StatusClass::RetryableFailure { throttled: true }),
            THROTTLE_PAUSE
        );
        assert_eq!(
            classifier.pause_for(StatusClass::RetryableFailure { throttled: false }),
            Duration::ZERO
        );
        assert_eq!(classifier.pause_for(StatusClass::Success), Duration::ZERO);
    }
}
