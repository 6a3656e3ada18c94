use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const RATE_LIMIT_MAX_RETRIES: usize = 5;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(60);

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if matches!(status.as_u16(), 503 | 529) {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("resource_exhausted")
        || lower.contains("quota")
        || lower.contains("overloaded")
}

/// `Retry-After` in seconds; HTTP dates are ignored.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Exponential backoff over a bounded number of retries.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    retries: usize,
    max_retries: usize,
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            retries: 0,
            max_retries,
            delay: base_delay,
        }
    }

    pub(crate) fn retries(&self) -> usize {
        self.retries
    }

    /// Sleeps before the next attempt, at least as long as `retry_after`.
    /// Returns false without sleeping once the retry budget is spent.
    pub(crate) async fn wait(&mut self, what: &str, retry_after: Option<Duration>) -> bool {
        if self.retries >= self.max_retries {
            return false;
        }
        self.retries += 1;
        let wait = retry_after.map_or(self.delay, |value| value.max(self.delay));
        warn!(
            "{}; retrying in {:.1}s (retry {}/{})",
            what,
            wait.as_secs_f32(),
            self.retries,
            self.max_retries
        );
        sleep(wait).await;
        self.delay = next_delay(self.delay);
        true
    }
}

fn next_delay(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_are_recognized_by_status_or_body() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_rate_limited(StatusCode::SERVICE_UNAVAILABLE, ""));
        assert!(is_rate_limited(StatusCode::BAD_REQUEST, "Quota exceeded for project"));
        assert!(!is_rate_limited(StatusCode::BAD_REQUEST, "invalid argument"));
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        assert_eq!(next_delay(Duration::from_millis(500)), Duration::from_secs(1));
        assert_eq!(next_delay(Duration::from_secs(45)), MAX_DELAY);
    }

    #[test]
    fn retry_after_reads_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn backoff_stops_after_the_budget() {
        let mut backoff = Backoff::new(2, Duration::ZERO);
        assert!(backoff.wait("test", None).await);
        assert!(backoff.wait("test", None).await);
        assert!(!backoff.wait("test", None).await);
        assert_eq!(backoff.retries(), 2);
    }
}
