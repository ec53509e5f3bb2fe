//! Error types for critique-clients

use thiserror::Error;

/// Errors raised by a text-generation or search capability
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// No API key was configured for the named service
    #[error("{service} is not configured: missing API key")]
    NotConfigured { service: &'static str },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service answered but the payload had no usable content
    #[error("{service} returned an empty response")]
    EmptyResponse { service: &'static str },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Injected failure from a test double
    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for CapabilityError {
    fn from(err: reqwest::Error) -> Self {
        CapabilityError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_service_and_code() {
        let err = CapabilityError::Status {
            service: "openai",
            status: 429,
            body: "rate limited".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("429"));
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn json_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CapabilityError = bad.into();
        assert!(err.to_string().starts_with("JSON parsing error"));
    }
}
