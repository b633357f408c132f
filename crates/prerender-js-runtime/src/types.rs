//! Typed structures crossing the host/script boundary.
//!
//! Requests are serialized to JSON before being handed to the bundle's
//! `main(request, callback)`; the callback reports a JSON payload that is
//! parsed back into a [`RenderResult`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Render request / result
// ─────────────────────────────────────────────────────────────────────────────

/// One inbound render call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Unique per inbound call
    #[serde(rename = "uuid")]
    pub correlation_id: String,
    /// URL the script should render
    #[serde(rename = "url")]
    pub target_url: String,
    /// Header snapshot, name to values
    pub headers: BTreeMap<String, Vec<String>>,
}

impl RenderRequest {
    /// Create a request for `target_url` with a fresh correlation id.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            target_url: target_url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Use an externally assigned correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Append a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }
}

/// What a render produced.
///
/// The script reports the string fields; `render_duration` is filled in by
/// the host and never read from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderResult {
    #[serde(rename = "uuid")]
    pub correlation_id: String,
    #[serde(rename = "app")]
    pub markup: String,
    pub title: String,
    #[serde(rename = "meta")]
    pub meta_tags: String,
    #[serde(rename = "initial")]
    pub initial_state: String,
    /// Empty means success
    pub error: String,
    /// Empty means no redirect
    pub redirect: String,
    #[serde(skip)]
    pub render_duration: Duration,
}

/// The active outcome of a [`RenderResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome<'a> {
    Error(&'a str),
    Redirect(&'a str),
    Markup(&'a str),
    /// Nothing was produced; callers treat this as an error.
    Invalid,
}

impl RenderResult {
    /// Build an error result.
    pub fn failure(
        correlation_id: impl Into<String>,
        error: impl Into<String>,
        render_duration: Duration,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: error.into(),
            render_duration,
            ..Default::default()
        }
    }

    /// Parse a payload reported by a script.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Classify the result. Error wins over redirect, redirect over markup.
    pub fn outcome(&self) -> RenderOutcome<'_> {
        if !self.error.is_empty() {
            RenderOutcome::Error(&self.error)
        } else if !self.redirect.is_empty() {
            RenderOutcome::Redirect(&self.redirect)
        } else if !self.markup.is_empty() {
            RenderOutcome::Markup(&self.markup)
        } else {
            RenderOutcome::Invalid
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome(),
            RenderOutcome::Markup(_) | RenderOutcome::Redirect(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host fetch types
// ─────────────────────────────────────────────────────────────────────────────

/// A fetch issued by a script through the host bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// The host's answer to a [`FetchRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_with_script_keys() {
        let request = RenderRequest::new("/about")
            .with_correlation_id("abc")
            .with_header("Accept", "text/html")
            .with_header("Accept", "application/xhtml+xml");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["uuid"], "abc");
        assert_eq!(json["url"], "/about");
        assert_eq!(
            json["headers"]["Accept"],
            serde_json::json!(["text/html", "application/xhtml+xml"])
        );
    }

    #[test]
    fn test_new_requests_get_distinct_ids() {
        let a = RenderRequest::new("/");
        let b = RenderRequest::new("/");
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn test_payload_parsing_ignores_duration_and_unknown_keys() {
        let result = RenderResult::from_payload(
            r#"{"uuid":"x","app":"<p>hi</p>","title":"Hi","extra":1,"render_duration":5}"#,
        )
        .unwrap();

        assert_eq!(result.markup, "<p>hi</p>");
        assert_eq!(result.title, "Hi");
        assert_eq!(result.render_duration, Duration::ZERO);
        assert_eq!(result.outcome(), RenderOutcome::Markup("<p>hi</p>"));
    }

    #[test]
    fn test_outcome_precedence() {
        let mut result = RenderResult {
            markup: "<p/>".into(),
            redirect: "/login".into(),
            ..Default::default()
        };
        assert_eq!(result.outcome(), RenderOutcome::Redirect("/login"));

        result.error = "boom".into();
        assert_eq!(result.outcome(), RenderOutcome::Error("boom"));
        assert!(!result.is_success());

        assert_eq!(RenderResult::default().outcome(), RenderOutcome::Invalid);
    }
}
