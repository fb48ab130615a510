use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TIMEOUT_MESSAGE: &str =
    "AI service timed out. Please try again - the service may be busy.";
pub const QUOTA_MESSAGE: &str =
    "AI service quota exceeded. Please wait a few minutes and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    QuotaExceeded,
    Validation,
    Transport,
    Unknown,
}

impl FailureKind {
    /// Structural classification from an HTTP status code.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            408 | 504 => Some(FailureKind::Timeout),
            429 => Some(FailureKind::QuotaExceeded),
            _ => None,
        }
    }

    /// Fallback classification for backends that only report failures as text.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline")
        {
            FailureKind::Timeout
        } else if lower.contains("quota") || lower.contains("429") {
            FailureKind::QuotaExceeded
        } else {
            FailureKind::Unknown
        }
    }
}

/// A failed call to one of the backend gateways, already reduced to a
/// user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: FailureKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    /// Builds the error for a non-2xx response. `detail` wins over `fallback`
    /// and the status code wins over message text.
    pub fn from_response(status: u16, detail: Option<String>, fallback: &str) -> Self {
        let message = detail
            .filter(|detail| !detail.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        let kind = FailureKind::from_status(status).unwrap_or_else(|| {
            match FailureKind::from_message(&message) {
                FailureKind::Unknown => FailureKind::Transport,
                kind => kind,
            }
        });
        Self { kind, message }
    }

    /// Message shown when extraction fails and the workflow returns to upload.
    pub fn extraction_message(&self) -> String {
        match self.kind {
            FailureKind::Timeout => TIMEOUT_MESSAGE.to_string(),
            FailureKind::QuotaExceeded => QUOTA_MESSAGE.to_string(),
            _ => self.message.clone(),
        }
    }
}
