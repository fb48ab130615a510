//! Upload → extract → verify → complete state machine.
//!
//! [`WorkflowController`] owns the only mutable [`WorkflowState`]; callers read
//! it through [`WorkflowController::state`] and change it only through the
//! controller's operations. Gateway failures never escape as errors: they are
//! recorded in `error_message` and the stage moves (or stays) accordingly.
//! [`WorkflowError`] is reserved for operations invoked in the wrong stage.

use std::{collections::BTreeSet, sync::Arc};

use shared::{
    domain::{FileId, PolicyField, PolicyRecord, Stage, TRACKABLE_FIELD_COUNT},
    error::GatewayError,
    protocol::{ExtractionResponse, VerificationRequest, VerificationResponse},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{validate_upload, PdfUpload, PolicyGateway};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{operation} requires stage {expected}, workflow is in {actual}")]
    WrongStage {
        operation: &'static str,
        expected: Stage,
        actual: Stage,
    },
    #[error("an extraction call is already in flight")]
    ExtractionInFlight,
    #[error("no extracted data to verify")]
    MissingExtraction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub stage: Stage,
    pub file_id: FileId,
    pub filename: String,
    pub extracted_data: Option<ExtractionResponse>,
    pub verification_result: Option<VerificationResponse>,
    pub error_message: Option<String>,
}

/// Fields the user changed during one verification session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditTrackingSet(BTreeSet<PolicyField>);

impl EditTrackingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: PolicyField) -> bool {
        self.0.insert(field)
    }

    pub fn contains(&self, field: PolicyField) -> bool {
        self.0.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PolicyField> + '_ {
        self.0.iter().copied()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.iter().map(|field| field.as_str().to_string()).collect()
    }
}

impl FromIterator<PolicyField> for EditTrackingSet {
    fn from_iter<T: IntoIterator<Item = PolicyField>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Working copy of the extracted record while the user reviews it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationDraft {
    pub record: PolicyRecord,
    pub edited: EditTrackingSet,
}

impl VerificationDraft {
    pub fn seed(record: &PolicyRecord) -> Self {
        Self {
            record: record.clone(),
            edited: EditTrackingSet::new(),
        }
    }

    /// Any change marks the field as edited, even one that restores the
    /// extracted value.
    pub fn edit(&mut self, field: PolicyField, value: impl Into<String>) {
        self.record.set(field, value);
        self.edited.insert(field);
    }
}

/// Proof that one particular extraction attempt was started. Not `Clone`:
/// each attempt yields exactly one outcome.
#[derive(Debug, PartialEq, Eq)]
pub struct ExtractionTicket {
    epoch: u64,
    attempt: u64,
    file_id: FileId,
}

impl ExtractionTicket {
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }
}

pub struct WorkflowController {
    gateway: Arc<dyn PolicyGateway>,
    state: WorkflowState,
    draft: Option<VerificationDraft>,
    epoch: u64,
    attempt: u64,
    extraction_in_flight: bool,
}

impl WorkflowController {
    pub fn new(gateway: Arc<dyn PolicyGateway>) -> Self {
        Self {
            gateway,
            state: WorkflowState::default(),
            draft: None,
            epoch: 0,
            attempt: 0,
            extraction_in_flight: false,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn draft(&self) -> Option<&VerificationDraft> {
        self.draft.as_ref()
    }

    pub async fn submit_upload(&mut self, file: PdfUpload) -> Result<Stage, WorkflowError> {
        self.require_stage("submit_upload", Stage::Upload)?;

        if let Err(err) = validate_upload(&file.filename, file.size_bytes()) {
            info!(filename = %file.filename, "upload rejected before dispatch: {}", err.message);
            self.state.error_message = Some(err.message);
            return Ok(self.state.stage);
        }

        match self.gateway.upload(&file).await {
            Ok(uploaded) => {
                self.state.file_id = uploaded.file_id;
                self.state.filename = uploaded.filename;
                self.state.error_message = None;
                self.transition(Stage::Extracting);
            }
            Err(err) => {
                warn!(
                    filename = %file.filename,
                    kind = ?err.kind,
                    "upload failed: {}",
                    err.message
                );
                self.state.error_message = Some(err.message);
            }
        }
        Ok(self.state.stage)
    }

    /// Uploads and, on success, immediately runs the extraction that entering
    /// `Extracting` implies.
    pub async fn upload_and_extract(&mut self, file: PdfUpload) -> Result<Stage, WorkflowError> {
        if self.submit_upload(file).await? == Stage::Extracting {
            return self.run_extraction().await;
        }
        Ok(self.state.stage)
    }

    pub async fn run_extraction(&mut self) -> Result<Stage, WorkflowError> {
        let ticket = self.begin_extraction()?;
        let result = self.gateway.extract(ticket.file_id()).await;
        Ok(self.complete_extraction(ticket, result))
    }

    /// Marks the single extraction call as issued. The caller performs the
    /// call and hands the outcome back to [`Self::complete_extraction`].
    pub fn begin_extraction(&mut self) -> Result<ExtractionTicket, WorkflowError> {
        self.require_stage("run_extraction", Stage::Extracting)?;
        if self.extraction_in_flight {
            return Err(WorkflowError::ExtractionInFlight);
        }
        self.extraction_in_flight = true;
        self.attempt += 1;
        debug!(
            file_id = %self.state.file_id,
            epoch = self.epoch,
            attempt = self.attempt,
            "extraction started"
        );
        Ok(ExtractionTicket {
            epoch: self.epoch,
            attempt: self.attempt,
            file_id: self.state.file_id.clone(),
        })
    }

    /// Applies an extraction outcome. Only the outcome of the attempt
    /// currently in flight, for the file currently uploaded, is applied;
    /// anything else (an earlier session, an earlier attempt) is dropped.
    pub fn complete_extraction(
        &mut self,
        ticket: ExtractionTicket,
        result: Result<ExtractionResponse, GatewayError>,
    ) -> Stage {
        if !self.is_current(&ticket) {
            debug!(
                ticket_epoch = ticket.epoch,
                ticket_attempt = ticket.attempt,
                ticket_file_id = %ticket.file_id,
                epoch = self.epoch,
                attempt = self.attempt,
                file_id = %self.state.file_id,
                "ignoring stale extraction result"
            );
            return self.state.stage;
        }
        self.extraction_in_flight = false;

        match result {
            Ok(extraction) => {
                self.draft = Some(VerificationDraft::seed(&extraction.data));
                self.state.extracted_data = Some(extraction);
                self.state.error_message = None;
                self.transition(Stage::Verify);
            }
            Err(err) => {
                let message = err.extraction_message();
                warn!(
                    file_id = %self.state.file_id,
                    kind = ?err.kind,
                    "extraction failed: {}",
                    err.message
                );
                self.state.error_message = Some(message);
                self.transition(Stage::Upload);
            }
        }
        self.state.stage
    }

    pub fn edit_field(
        &mut self,
        field: PolicyField,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        self.require_stage("edit_field", Stage::Verify)?;
        self.draft_mut().edit(field, value);
        Ok(())
    }

    pub async fn submit_verification(
        &mut self,
        edited_record: PolicyRecord,
        edited_fields: &EditTrackingSet,
    ) -> Result<Stage, WorkflowError> {
        self.require_stage("submit_verification", Stage::Verify)?;
        let Some(extraction) = self.state.extracted_data.as_ref() else {
            return Err(WorkflowError::MissingExtraction);
        };

        let request = VerificationRequest {
            extraction_id: extraction.extraction_id.clone(),
            verified_data: edited_record,
            edited_fields: edited_fields.field_names(),
        };

        match self.gateway.verify(&request).await {
            Ok(result) => {
                if result.total_fields as usize != TRACKABLE_FIELD_COUNT {
                    warn!(
                        reported = result.total_fields,
                        expected = TRACKABLE_FIELD_COUNT,
                        "backend total_fields differs from client field count; using backend value"
                    );
                }
                if !result.counts_are_consistent() {
                    warn!(
                        total_fields = result.total_fields,
                        edited_fields_count = result.edited_fields_count,
                        "backend reported more edited fields than total; extracted count clamped to 0"
                    );
                }
                self.state.verification_result = Some(result);
                self.state.error_message = None;
                self.draft = None;
                self.transition(Stage::Complete);
            }
            Err(err) => {
                warn!(
                    extraction_id = %request.extraction_id,
                    kind = ?err.kind,
                    "verification failed: {}",
                    err.message
                );
                self.state.error_message = Some(err.message);
            }
        }
        Ok(self.state.stage)
    }

    /// Submits the controller-held draft with its edit tracking.
    pub async fn submit_draft(&mut self) -> Result<Stage, WorkflowError> {
        self.require_stage("submit_verification", Stage::Verify)?;
        let draft = self.draft_mut().clone();
        self.submit_verification(draft.record, &draft.edited).await
    }

    pub fn reset(&mut self) {
        self.epoch += 1;
        self.extraction_in_flight = false;
        self.draft = None;
        self.state = WorkflowState::default();
        info!(epoch = self.epoch, "workflow reset");
    }

    fn require_stage(&self, operation: &'static str, expected: Stage) -> Result<(), WorkflowError> {
        if self.state.stage == expected {
            Ok(())
        } else {
            Err(WorkflowError::WrongStage {
                operation,
                expected,
                actual: self.state.stage,
            })
        }
    }

    fn is_current(&self, ticket: &ExtractionTicket) -> bool {
        self.extraction_in_flight
            && self.state.stage == Stage::Extracting
            && ticket.epoch == self.epoch
            && ticket.attempt == self.attempt
            && ticket.file_id == self.state.file_id
    }

    fn draft_mut(&mut self) -> &mut VerificationDraft {
        let extracted = &self.state.extracted_data;
        self.draft.get_or_insert_with(|| {
            VerificationDraft::seed(&extracted.as_ref().map(|e| e.data.clone()).unwrap_or_default())
        })
    }

    fn transition(&mut self, next: Stage) {
        info!(from = %self.state.stage, to = %next, "workflow stage changed");
        self.state.stage = next;
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
