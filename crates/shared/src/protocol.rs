use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ExtractionId, FileId, PolicyRecord};

/// Body of a non-2xx response from the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: FileId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub extraction_id: ExtractionId,
    pub data: PolicyRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub extraction_id: ExtractionId,
    pub verified_data: PolicyRecord,
    pub edited_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub accuracy_score: f64,
    pub total_fields: u32,
    pub edited_fields_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerificationResponse {
    pub fn extracted_fields_count(&self) -> u32 {
        self.total_fields.saturating_sub(self.edited_fields_count)
    }

    /// False when more fields were edited than exist, in which case
    /// `extracted_fields_count` is clamped and the counts no longer add up.
    pub fn counts_are_consistent(&self) -> bool {
        self.edited_fields_count <= self.total_fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

impl SearchQuery {
    /// Drops blank criteria so they are not sent as empty parameters.
    pub fn normalized(&self) -> Self {
        fn keep(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        }

        Self {
            policy_holder: keep(&self.policy_holder),
            registration_no: keep(&self.registration_no),
            expiry_date: keep(&self.expiry_date),
        }
    }

    pub fn is_empty(&self) -> bool {
        let normalized = self.normalized();
        normalized.policy_holder.is_none()
            && normalized.registration_no.is_none()
            && normalized.expiry_date.is_none()
    }
}

/// One saved record as returned by the search endpoint (column name → value).
pub type SearchRecord = BTreeMap<String, String>;
