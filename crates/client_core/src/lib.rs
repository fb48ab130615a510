use std::path::Path;

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::FileId,
    error::{FailureKind, GatewayError},
    protocol::{
        ErrorDetail, ExtractionResponse, SearchQuery, SearchRecord, UploadResponse,
        VerificationRequest, VerificationResponse,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod config;
pub mod progress;
pub mod search;
pub mod view;
pub mod workflow;

pub use config::{load_settings, ApiConfig, ConfigError};
pub use progress::{ExtractionProgress, ProgressSnapshot};
pub use search::{run_search, SearchOutcome};
pub use view::{render, AccuracyRating, FieldStatus, FieldView, StageView, SummaryView};
pub use workflow::{
    EditTrackingSet, ExtractionTicket, VerificationDraft, WorkflowController, WorkflowError,
    WorkflowState,
};

/// Largest document accepted for upload (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const UPLOAD_FALLBACK: &str = "Upload failed";
const EXTRACTION_FALLBACK: &str = "Extraction failed";
const VERIFICATION_FALLBACK: &str = "Verification failed";
const SEARCH_FALLBACK: &str = "Search failed";

/// A single document selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Reads a document from disk. Type and size are checked against the file
    /// metadata first, so an oversized file is never loaded.
    pub async fn from_path(path: &Path) -> Result<Self, ReadPdfError> {
        let io_err = |source: std::io::Error| ReadPdfError::Io {
            path: path.display().to_string(),
            source,
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
        validate_upload(&filename, metadata.len()).map_err(ReadPdfError::Rejected)?;

        let bytes = tokio::fs::read(path).await.map_err(io_err)?;
        Ok(Self { filename, bytes })
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Error)]
pub enum ReadPdfError {
    #[error("{0}")]
    Rejected(GatewayError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Pre-flight checks run before any upload is dispatched.
pub fn validate_upload(filename: &str, size_bytes: u64) -> Result<(), GatewayError> {
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(GatewayError::validation("Only PDF files are allowed"));
    }
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(GatewayError::validation("File size must be less than 10MB"));
    }
    Ok(())
}

/// The three backend calls that drive the workflow.
#[async_trait]
pub trait PolicyGateway: Send + Sync {
    async fn upload(&self, file: &PdfUpload) -> Result<UploadResponse, GatewayError>;
    async fn extract(&self, file_id: &FileId) -> Result<ExtractionResponse, GatewayError>;
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, GatewayError>;
}

#[async_trait]
pub trait RecordSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchRecord>, GatewayError>;
}

pub struct HttpPolicyGateway {
    http: Client,
    config: ApiConfig,
}

impl HttpPolicyGateway {
    pub fn new(config: &ApiConfig) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| GatewayError::transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl PolicyGateway for HttpPolicyGateway {
    async fn upload(&self, file: &PdfUpload) -> Result<UploadResponse, GatewayError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str("application/pdf")
            .map_err(|e| send_failure(e, UPLOAD_FALLBACK))?;
        let form = multipart::Form::new().part("file", part);

        debug!(
            filename = %file.filename,
            size_bytes = file.size_bytes(),
            "uploading policy document"
        );
        let response = self
            .http
            .post(self.config.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_failure(e, UPLOAD_FALLBACK))?;
        let body: UploadResponse = read_json(response, UPLOAD_FALLBACK).await?;

        if body.file_id.is_empty() || body.filename.is_empty() {
            return Err(GatewayError::transport(format!(
                "{UPLOAD_FALLBACK}: response is missing file_id or filename"
            )));
        }
        info!(file_id = %body.file_id, filename = %body.filename, "policy document uploaded");
        Ok(body)
    }

    async fn extract(&self, file_id: &FileId) -> Result<ExtractionResponse, GatewayError> {
        let response = self
            .http
            .post(self.config.extract_url(file_id))
            .send()
            .await
            .map_err(|e| send_failure(e, EXTRACTION_FALLBACK))?;
        let body: ExtractionResponse = read_json(response, EXTRACTION_FALLBACK).await?;
        info!(
            %file_id,
            extraction_id = %body.extraction_id,
            populated = body.data.populated_trackable_count(),
            "policy data extracted"
        );
        Ok(body)
    }

    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, GatewayError> {
        let response = self
            .http
            .post(self.config.verify_url())
            .json(request)
            .send()
            .await
            .map_err(|e| send_failure(e, VERIFICATION_FALLBACK))?;
        let body: VerificationResponse = read_json(response, VERIFICATION_FALLBACK).await?;
        info!(
            extraction_id = %request.extraction_id,
            accuracy_score = body.accuracy_score,
            edited_fields_count = body.edited_fields_count,
            "policy data verified"
        );
        Ok(body)
    }
}

#[async_trait]
impl RecordSearch for HttpPolicyGateway {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchRecord>, GatewayError> {
        let response = self
            .http
            .get(self.config.search_url())
            .query(&query.normalized())
            .send()
            .await
            .map_err(|e| send_failure(e, SEARCH_FALLBACK))?;
        let body: serde_json::Value = read_json(response, SEARCH_FALLBACK).await?;
        Ok(search::records_from_value(body))
    }
}

fn send_failure(err: reqwest::Error, fallback: &str) -> GatewayError {
    if err.is_timeout() {
        GatewayError::new(FailureKind::Timeout, format!("{fallback}: request timed out"))
    } else if err.is_connect() {
        GatewayError::transport(format!("{fallback}: backend unreachable ({err})"))
    } else {
        GatewayError::transport(format!("{fallback}: {err}"))
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    fallback: &str,
) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let raw = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorDetail>(&raw)
            .ok()
            .and_then(|body| body.detail);
        let err = GatewayError::from_response(status.as_u16(), detail, fallback);
        warn!(status = status.as_u16(), kind = ?err.kind, "backend call failed: {}", err.message);
        return Err(err);
    }

    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::transport(format!("{fallback}: malformed response ({e})")))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
