use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 2;
pub(crate) const RETRY_BACKOFF_BASE_MS: u64 = 100;
pub(crate) const RETRY_BACKOFF_MAX_MS: u64 = 1_000;
pub(crate) const RETRY_AFTER_MAX_SECS: u64 = 30;

/// Statuses worth another attempt on an idempotent call.
#[inline]
pub(crate) fn should_retry_upstream_status(status: http::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

#[inline]
pub(crate) fn should_retry_transport_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[inline]
pub(crate) fn retry_backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(10);
    let multiplier = 1_u64 << shift;
    Duration::from_millis(
        RETRY_BACKOFF_BASE_MS
            .saturating_mul(multiplier)
            .min(RETRY_BACKOFF_MAX_MS),
    )
}

#[inline]
pub(crate) fn retry_delay(headers: &http::HeaderMap, attempt: u32) -> Duration {
    parse_retry_after_delay(headers).unwrap_or_else(|| retry_backoff_delay(attempt))
}

/// `Retry-After` as delta-seconds or an HTTP-date, capped. Dates in the past
/// mean no wait.
#[inline]
pub(crate) fn parse_retry_after_delay(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds.min(RETRY_AFTER_MAX_SECS)));
    }
    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(Duration::from_secs(RETRY_AFTER_MAX_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_upstream_status() {
        assert!(should_retry_upstream_status(
            http::StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(should_retry_upstream_status(
            http::StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(!should_retry_upstream_status(http::StatusCode::BAD_REQUEST));
        assert!(!should_retry_upstream_status(
            http::StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(retry_backoff_delay(0), Duration::from_millis(100));
        assert_eq!(retry_backoff_delay(1), Duration::from_millis(200));
        assert_eq!(retry_backoff_delay(8), Duration::from_millis(1_000));
    }

    #[test]
    fn test_retry_after_seconds_are_capped() {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("3"));
        assert_eq!(retry_delay(&headers, 0), Duration::from_secs(3));
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("600"));
        assert_eq!(
            retry_delay(&headers, 0),
            Duration::from_secs(RETRY_AFTER_MAX_SECS)
        );
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("soon"));
        assert_eq!(retry_delay(&headers, 1), Duration::from_millis(200));
    }

    #[test]
    fn test_retry_after_http_date() {
        let mut headers = http::HeaderMap::new();
        let later = SystemTime::now() + Duration::from_secs(600);
        headers.insert(
            RETRY_AFTER,
            http::HeaderValue::from_str(&httpdate::fmt_http_date(later)).unwrap(),
        );
        assert_eq!(
            parse_retry_after_delay(&headers),
            Some(Duration::from_secs(RETRY_AFTER_MAX_SECS))
        );

        headers.insert(
            RETRY_AFTER,
            http::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_delay(&headers, 1), Duration::ZERO);
    }
}
