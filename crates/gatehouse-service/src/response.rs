//! Response envelope shared by every JSON endpoint.
//!
//! ```json
//! {
//!   "success": true,
//!   "message": "User information retrieved",
//!   "data": { ... },
//!   "metadata": {
//!     "timestamp": "2025-01-01T00:00:00Z",
//!     "version": "1.0",
//!     "ttl": { "value": 300, "unit": "seconds", "expires_at": "...", "human_readable": "5 minutes" }
//!   }
//! }
//! ```

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;

/// API contract version reported in every envelope.
pub const API_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize)]
pub struct TtlInfo {
    pub value: u64,
    pub unit: &'static str,
    pub expires_at: String,
    pub human_readable: String,
}

impl TtlInfo {
    fn from_now(ttl: Duration, now: DateTime<Utc>) -> Self {
        let seconds = ttl.as_secs();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        Self {
            value: seconds,
            unit: "seconds",
            expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            human_readable: humanize(seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub timestamp: String,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<TtlInfo>,
}

impl Metadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: API_VERSION,
            ttl: None,
        }
    }
}

/// Successful response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    pub metadata: Metadata,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            metadata: Metadata::now(),
        }
    }

    /// Advertise how long the client may reuse this payload.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.metadata.ttl = Some(TtlInfo::from_now(ttl, Utc::now()));
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// "1 hour 5 minutes", "30 seconds".
fn humanize(seconds: u64) -> String {
    if seconds == 0 {
        return "0 seconds".to_string();
    }
    let units = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];
    let mut remaining = seconds;
    let mut parts = Vec::new();
    for (size, name) in units {
        let count = remaining / size;
        if count > 0 {
            remaining %= size;
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }
    parts.join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(0), "0 seconds");
        assert_eq!(humanize(1), "1 second");
        assert_eq!(humanize(300), "5 minutes");
        assert_eq!(humanize(3_900), "1 hour 5 minutes");
        assert_eq!(humanize(90_061), "1 day 1 hour 1 minute 1 second");
    }

    #[test]
    fn test_envelope_without_ttl() {
        let json = serde_json::to_value(ApiResponse::new(
            serde_json::json!({"k": "v"}),
            "ok",
        ))
        .unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "ok");
        assert_eq!(json["data"]["k"], "v");
        assert_eq!(json["metadata"]["version"], "1.0");
        assert!(json["metadata"].get("ttl").is_none());
    }

    #[test]
    fn test_ttl_expiry_is_offset_from_now() {
        let now = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ttl = TtlInfo::from_now(Duration::from_secs(600), now);

        assert_eq!(ttl.value, 600);
        assert_eq!(ttl.unit, "seconds");
        assert_eq!(ttl.expires_at, "2025-01-01T00:10:00Z");
        assert_eq!(ttl.human_readable, "10 minutes");
    }

    #[test]
    fn test_envelope_with_ttl() {
        let json = serde_json::to_value(
            ApiResponse::new(1, "cached").with_ttl(Duration::from_secs(300)),
        )
        .unwrap();
        assert_eq!(json["metadata"]["ttl"]["value"], 300);
    }
}
