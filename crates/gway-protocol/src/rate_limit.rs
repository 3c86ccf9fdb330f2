use std::time::{Duration, SystemTime};

use http::HeaderMap;

/// Rate-limit bookkeeping parsed from an upstream response, normalized
/// across the OpenAI / Anthropic / Google header dialects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    pub requests_limit: Option<u64>,
    pub requests_remaining: Option<u64>,
    pub requests_reset: Option<Duration>,
    pub tokens_limit: Option<u64>,
    pub tokens_remaining: Option<u64>,
    pub tokens_reset: Option<Duration>,
    pub retry_after: Option<Duration>,
}

/// Parses whichever rate-limit dialect is present, trying OpenAI first,
/// then Anthropic, then Google. Returns `None` only if no recognized field
/// was found anywhere in `headers`.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let mut info = RateLimitInfo::default();
    let mut found = false;

    // Dialect 1: OpenAI-style `X-Ratelimit-{Limit,Remaining,Reset}-{Requests,Tokens}`.
    found |= fill_u64(headers, "x-ratelimit-limit-requests", &mut info.requests_limit);
    found |= fill_u64(
        headers,
        "x-ratelimit-remaining-requests",
        &mut info.requests_remaining,
    );
    found |= fill_duration_secs(
        headers,
        "x-ratelimit-reset-requests",
        &mut info.requests_reset,
    );
    found |= fill_u64(headers, "x-ratelimit-limit-tokens", &mut info.tokens_limit);
    found |= fill_u64(
        headers,
        "x-ratelimit-remaining-tokens",
        &mut info.tokens_remaining,
    );
    found |= fill_duration_secs(headers, "x-ratelimit-reset-tokens", &mut info.tokens_reset);

    // Dialect 2: Anthropic-style `Anthropic-Ratelimit-{Requests,Tokens}-{Limit,Remaining,Reset}`.
    // Reset is an absolute RFC3339 timestamp; normalized to a duration from now.
    found |= fill_u64(
        headers,
        "anthropic-ratelimit-requests-limit",
        &mut info.requests_limit,
    );
    found |= fill_u64(
        headers,
        "anthropic-ratelimit-requests-remaining",
        &mut info.requests_remaining,
    );
    found |= fill_timestamp(
        headers,
        "anthropic-ratelimit-requests-reset",
        &mut info.requests_reset,
    );
    found |= fill_u64(
        headers,
        "anthropic-ratelimit-tokens-limit",
        &mut info.tokens_limit,
    );
    found |= fill_u64(
        headers,
        "anthropic-ratelimit-tokens-remaining",
        &mut info.tokens_remaining,
    );
    found |= fill_timestamp(
        headers,
        "anthropic-ratelimit-tokens-reset",
        &mut info.tokens_reset,
    );

    // Dialect 3: Google-style `X-Goog-Ratelimit-{Limit,Remaining}` (no token split).
    found |= fill_u64(headers, "x-goog-ratelimit-limit", &mut info.requests_limit);
    found |= fill_u64(
        headers,
        "x-goog-ratelimit-remaining",
        &mut info.requests_remaining,
    );

    if let Some(retry_after) = parse_retry_after(headers) {
        info.retry_after = Some(retry_after);
        found = true;
    }

    if found { Some(info) } else { None }
}

/// `Retry-After`: integer seconds, or an HTTP-date. A past absolute date
/// clamps to zero rather than being treated as "never retry".
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let raw = raw.trim();

    if let Ok(seconds) = raw.parse::<i64>() {
        return Some(Duration::from_secs(seconds.max(0) as u64));
    }

    let when = httpdate::parse_http_date(raw).ok()?;
    Some(
        when.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

fn fill_u64(headers: &HeaderMap, name: &str, slot: &mut Option<u64>) -> bool {
    if slot.is_some() {
        return false;
    }
    let Some(value) = header_str(headers, name).and_then(|v| v.parse::<u64>().ok()) else {
        return false;
    };
    *slot = Some(value);
    true
}

fn fill_duration_secs(headers: &HeaderMap, name: &str, slot: &mut Option<Duration>) -> bool {
    if slot.is_some() {
        return false;
    }
    let Some(value) = header_str(headers, name).and_then(parse_duration_literal) else {
        return false;
    };
    *slot = Some(value);
    true
}

fn fill_timestamp(headers: &HeaderMap, name: &str, slot: &mut Option<Duration>) -> bool {
    if slot.is_some() {
        return false;
    }
    let Some(raw) = header_str(headers, name) else {
        return false;
    };
    let Ok(parsed) =
        time::OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339)
    else {
        return false;
    };
    let now = time::OffsetDateTime::now_utc();
    let delta = parsed - now;
    let seconds = delta.whole_seconds().max(0) as u64;
    *slot = Some(Duration::from_secs(seconds));
    true
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Accepts either a bare integer (seconds) or a Go-style duration suffix
/// (`"6s"`, `"1500ms"`) as seen on reset headers in the wild.
fn parse_duration_literal(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(Duration::from_secs_f64(seconds));
        }
        return None;
    }
    if let Some(digits) = raw.strip_suffix("ms") {
        return digits.parse::<f64>().ok().map(Duration::from_millis_f64);
    }
    if let Some(digits) = raw.strip_suffix('s') {
        return digits.parse::<f64>().ok().map(Duration::from_secs_f64);
    }
    None
}

trait FromMillisF64 {
    fn from_millis_f64(millis: f64) -> Duration;
}

impl FromMillisF64 for Duration {
    fn from_millis_f64(millis: f64) -> Duration {
        Duration::from_secs_f64((millis.max(0.0)) / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_from(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                http::HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn returns_none_when_no_recognized_field_present() {
        let headers = headers_from(&[("content-type", "application/json")]);
        assert!(parse_rate_limit_headers(&headers).is_none());
    }

    #[test]
    fn parses_openai_dialect() {
        let headers = headers_from(&[
            ("x-ratelimit-limit-requests", "100"),
            ("x-ratelimit-remaining-requests", "99"),
            ("x-ratelimit-reset-requests", "6s"),
            ("x-ratelimit-limit-tokens", "10000"),
            ("x-ratelimit-remaining-tokens", "9000"),
        ]);
        let info = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(info.requests_limit, Some(100));
        assert_eq!(info.requests_remaining, Some(99));
        assert_eq!(info.requests_reset, Some(Duration::from_secs(6)));
        assert_eq!(info.tokens_limit, Some(10_000));
        assert_eq!(info.tokens_remaining, Some(9_000));
    }

    #[test]
    fn parses_google_dialect() {
        let headers = headers_from(&[
            ("x-goog-ratelimit-limit", "60"),
            ("x-goog-ratelimit-remaining", "12"),
        ]);
        let info = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(info.requests_limit, Some(60));
        assert_eq!(info.requests_remaining, Some(12));
        assert_eq!(info.tokens_limit, None);
    }

    #[test]
    fn retry_after_integer_seconds() {
        let headers = headers_from(&[("retry-after", "30")]);
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));
    }

    #[test]
    fn retry_after_past_http_date_clamps_to_zero() {
        let headers = headers_from(&[("retry-after", "Tue, 01 Jan 2000 00:00:00 GMT")]);
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn unparseable_values_are_silently_skipped() {
        let headers = headers_from(&[("x-ratelimit-limit-requests", "not-a-number")]);
        assert!(parse_rate_limit_headers(&headers).is_none());
    }

    #[test]
    fn openai_dialect_takes_priority_over_anthropic() {
        let headers = headers_from(&[
            ("x-ratelimit-limit-requests", "100"),
            ("anthropic-ratelimit-requests-limit", "5"),
        ]);
        let info = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(info.requests_limit, Some(100));
    }
}
