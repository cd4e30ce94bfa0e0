//! Translation of non-2xx forge responses into the error taxonomy.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::utils::errors::GitzipError;

/// Fallback wait when a rate-limited response carries no reset information.
const DEFAULT_QUOTA_WAIT_SECS: i64 = 60;

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// Classify a failed response by status, rate-limit headers and message body.
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &str) -> GitzipError {
    let message = serde_json::from_str::<ApiMessage>(body)
        .ok()
        .map(|m| m.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"));
    let lower = message.to_lowercase();

    let quota_exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || lower.contains("rate limit")
        || (status == StatusCode::FORBIDDEN && quota_exhausted);

    if rate_limited {
        return GitzipError::Quota {
            reset_at: reset_time(headers),
        };
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GitzipError::Auth(message),
        StatusCode::NOT_FOUND => GitzipError::NotFound(message),
        s if s.is_client_error() && looks_like_credential_problem(&lower) => {
            GitzipError::Auth(message)
        }
        s => GitzipError::Transient(format!("HTTP {}: {}", s.as_u16(), message)),
    }
}

/// Network-level failure (DNS, TLS, timeout, reset connection).
pub fn classify_transport(error: &reqwest::Error) -> GitzipError {
    GitzipError::Transient(format!("request failed: {error}"))
}

fn looks_like_credential_problem(message: &str) -> bool {
    message.contains("bad credentials") || message.contains("token")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Reset time from `x-ratelimit-reset` (epoch seconds) or `retry-after` (seconds).
fn reset_time(headers: &HeaderMap) -> DateTime<Utc> {
    if let Some(reset) = header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        return reset;
    }

    let wait = header_str(headers, "retry-after")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_QUOTA_WAIT_SECS);
    Utc::now() + Duration::seconds(wait)
}
