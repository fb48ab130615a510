use super::*;

use std::sync::Mutex;

use async_trait::async_trait;
use shared::{
    domain::ExtractionId,
    error::{FailureKind, QUOTA_MESSAGE, TIMEOUT_MESSAGE},
    protocol::UploadResponse,
};

use crate::MAX_UPLOAD_BYTES;

#[derive(Default)]
struct ScriptedGateway {
    upload: Mutex<Option<Result<UploadResponse, GatewayError>>>,
    extract: Mutex<Option<Result<ExtractionResponse, GatewayError>>>,
    verify: Mutex<Option<Result<VerificationResponse, GatewayError>>>,
    upload_calls: Mutex<u32>,
    extract_calls: Mutex<Vec<FileId>>,
    verify_requests: Mutex<Vec<VerificationRequest>>,
}

impl ScriptedGateway {
    fn with_upload(self, result: Result<UploadResponse, GatewayError>) -> Self {
        *self.upload.lock().expect("lock") = Some(result);
        self
    }

    fn with_extract(self, result: Result<ExtractionResponse, GatewayError>) -> Self {
        *self.extract.lock().expect("lock") = Some(result);
        self
    }

    fn with_verify(self, result: Result<VerificationResponse, GatewayError>) -> Self {
        *self.verify.lock().expect("lock") = Some(result);
        self
    }

    fn upload_calls(&self) -> u32 {
        *self.upload_calls.lock().expect("lock")
    }
}

#[async_trait]
impl PolicyGateway for ScriptedGateway {
    async fn upload(&self, _file: &PdfUpload) -> Result<UploadResponse, GatewayError> {
        *self.upload_calls.lock().expect("lock") += 1;
        self.upload
            .lock()
            .expect("lock")
            .clone()
            .unwrap_or_else(|| Err(GatewayError::transport("upload not scripted")))
    }

    async fn extract(&self, file_id: &FileId) -> Result<ExtractionResponse, GatewayError> {
        self.extract_calls.lock().expect("lock").push(file_id.clone());
        self.extract
            .lock()
            .expect("lock")
            .clone()
            .unwrap_or_else(|| Err(GatewayError::transport("extract not scripted")))
    }

    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, GatewayError> {
        self.verify_requests.lock().expect("lock").push(request.clone());
        self.verify
            .lock()
            .expect("lock")
            .clone()
            .unwrap_or_else(|| Err(GatewayError::transport("verify not scripted")))
    }
}

fn uploaded(file_id: &str, filename: &str) -> UploadResponse {
    UploadResponse {
        file_id: FileId::from(file_id),
        filename: filename.to_string(),
        message: None,
    }
}

fn jane_doe_extraction() -> ExtractionResponse {
    let mut data = PolicyRecord::default();
    data.set(PolicyField::PolicyHolder, "Jane Doe");
    ExtractionResponse {
        extraction_id: ExtractionId::from("e1"),
        data,
        message: None,
    }
}

fn accuracy(score: f64, total: u32, edited: u32) -> VerificationResponse {
    VerificationResponse {
        accuracy_score: score,
        total_fields: total,
        edited_fields_count: edited,
        message: None,
    }
}

fn policy_pdf(size: usize) -> PdfUpload {
    PdfUpload::new("policy.pdf", vec![0u8; size])
}

fn controller(gateway: &Arc<ScriptedGateway>) -> WorkflowController {
    WorkflowController::new(gateway.clone())
}

fn assert_pristine(state: &WorkflowState) {
    assert_eq!(state.stage, Stage::Upload);
    assert!(state.file_id.is_empty());
    assert!(state.filename.is_empty());
    assert!(state.extracted_data.is_none());
    assert!(state.verification_result.is_none());
    assert!(state.error_message.is_none());
}

#[tokio::test]
async fn upload_then_extraction_reaches_verify_with_one_populated_field() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Ok(jane_doe_extraction())),
    );
    let mut workflow = controller(&gateway);

    let stage = workflow
        .submit_upload(policy_pdf(2 * 1024 * 1024))
        .await
        .expect("upload");
    assert_eq!(stage, Stage::Extracting);
    assert_eq!(workflow.state().file_id, FileId::from("f1"));
    assert_eq!(workflow.state().filename, "policy.pdf");

    let stage = workflow.run_extraction().await.expect("extract");
    assert_eq!(stage, Stage::Verify);
    let extracted = workflow.state().extracted_data.as_ref().expect("data");
    assert_eq!(extracted.data.populated_trackable_count(), 1);
    assert_eq!(
        gateway.extract_calls.lock().expect("lock").as_slice(),
        &[FileId::from("f1")]
    );
    assert!(workflow.draft().expect("draft").edited.is_empty());
}

#[tokio::test]
async fn invalid_files_never_reach_the_gateway() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Ok(uploaded("f1", "x.pdf"))));
    let mut workflow = controller(&gateway);

    let stage = workflow
        .submit_upload(PdfUpload::new("policy.docx", vec![1, 2, 3]))
        .await
        .expect("upload");
    assert_eq!(stage, Stage::Upload);
    assert_eq!(
        workflow.state().error_message.as_deref(),
        Some("Only PDF files are allowed")
    );

    let stage = workflow
        .submit_upload(policy_pdf(MAX_UPLOAD_BYTES as usize + 1))
        .await
        .expect("upload");
    assert_eq!(stage, Stage::Upload);
    assert_eq!(
        workflow.state().error_message.as_deref(),
        Some("File size must be less than 10MB")
    );

    assert_eq!(gateway.upload_calls(), 0);
}

#[tokio::test]
async fn uppercase_extension_and_exact_limit_are_accepted() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Ok(uploaded("f2", "SCAN.PDF"))));
    let mut workflow = controller(&gateway);

    let stage = workflow
        .submit_upload(PdfUpload::new(
            "SCAN.PDF",
            vec![0u8; MAX_UPLOAD_BYTES as usize],
        ))
        .await
        .expect("upload");
    assert_eq!(stage, Stage::Extracting);
    assert_eq!(gateway.upload_calls(), 1);
}

#[tokio::test]
async fn upload_failure_stays_in_upload_with_message() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Err(
        GatewayError::from_response(400, Some("Only PDF files are allowed".into()), "Upload failed"),
    )));
    let mut workflow = controller(&gateway);

    let stage = workflow.submit_upload(policy_pdf(10)).await.expect("upload");
    assert_eq!(stage, Stage::Upload);
    assert!(workflow.state().file_id.is_empty());
    assert_eq!(
        workflow.state().error_message.as_deref(),
        Some("Only PDF files are allowed")
    );
}

#[tokio::test]
async fn quota_failure_returns_to_upload_with_quota_message() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Err(GatewayError::from_response(
                429,
                Some("Resource has been exhausted".into()),
                "Extraction failed",
            ))),
    );
    let mut workflow = controller(&gateway);

    let stage = workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");
    assert_eq!(stage, Stage::Upload);
    let message = workflow.state().error_message.clone().expect("message");
    assert!(message.contains("quota"));
    assert_eq!(message, QUOTA_MESSAGE);
    assert!(workflow.state().extracted_data.is_none());
}

#[tokio::test]
async fn timeout_and_generic_extraction_failures_are_classified() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Err(GatewayError::new(
                FailureKind::Timeout,
                "Extraction failed: request timed out",
            ))),
    );
    let mut workflow = controller(&gateway);
    workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");
    assert_eq!(
        workflow.state().error_message.as_deref(),
        Some(TIMEOUT_MESSAGE)
    );

    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Err(GatewayError::from_response(
                404,
                Some("File not found".into()),
                "Extraction failed",
            ))),
    );
    let mut workflow = controller(&gateway);
    workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");
    assert_eq!(workflow.stage(), Stage::Upload);
    assert_eq!(
        workflow.state().error_message.as_deref(),
        Some("File not found")
    );
}

#[tokio::test]
async fn editing_policy_number_only_reports_one_edited_field() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Ok(jane_doe_extraction()))
            .with_verify(Ok(accuracy(90.0, 10, 1))),
    );
    let mut workflow = controller(&gateway);
    workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");

    workflow
        .edit_field(PolicyField::PolicyNumber, "POL-778")
        .expect("edit");
    let stage = workflow.submit_draft().await.expect("verify");
    assert_eq!(stage, Stage::Complete);

    let requests = gateway.verify_requests.lock().expect("lock").clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].extraction_id, ExtractionId::from("e1"));
    assert_eq!(requests[0].edited_fields, vec!["policy_number".to_string()]);
    assert_eq!(
        requests[0].verified_data.get(PolicyField::PolicyNumber),
        Some("POL-778")
    );
    assert_eq!(
        requests[0].verified_data.get(PolicyField::PolicyHolder),
        Some("Jane Doe")
    );

    let result = workflow
        .state()
        .verification_result
        .as_ref()
        .expect("result");
    assert_eq!(result.extracted_fields_count(), 9);
    assert_eq!(
        result.extracted_fields_count() + result.edited_fields_count,
        result.total_fields
    );
    assert!(workflow.draft().is_none());
}

#[tokio::test]
async fn explicit_submission_sends_given_record_and_fields() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Ok(jane_doe_extraction()))
            .with_verify(Ok(accuracy(80.0, 10, 2))),
    );
    let mut workflow = controller(&gateway);
    workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");

    let mut record = PolicyRecord::default();
    record.set(PolicyField::InsurerName, "Acme Mutual");
    record.set(PolicyField::SumInsured, "500000");
    let edited: EditTrackingSet = [PolicyField::SumInsured, PolicyField::InsurerName]
        .into_iter()
        .collect();

    let stage = workflow
        .submit_verification(record, &edited)
        .await
        .expect("verify");
    assert_eq!(stage, Stage::Complete);
    let requests = gateway.verify_requests.lock().expect("lock").clone();
    assert_eq!(
        requests[0].edited_fields,
        vec!["insurer_name".to_string(), "sum_insured".to_string()]
    );
}

#[tokio::test]
async fn inconsistent_verification_counts_still_complete() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Ok(jane_doe_extraction()))
            .with_verify(Ok(accuracy(0.0, 10, 12))),
    );
    let mut workflow = controller(&gateway);
    workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");

    let stage = workflow.submit_draft().await.expect("verify");
    assert_eq!(stage, Stage::Complete);
    let result = workflow
        .state()
        .verification_result
        .clone()
        .expect("result");
    assert!(!result.counts_are_consistent());
    assert_eq!(result.extracted_fields_count(), 0);
    assert_eq!(result.edited_fields_count, 12);
}

#[tokio::test]
async fn verification_failure_keeps_verify_and_allows_retry() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Ok(jane_doe_extraction()))
            .with_verify(Err(GatewayError::from_response(
                500,
                None,
                "Verification failed",
            ))),
    );
    let mut workflow = controller(&gateway);
    workflow
        .upload_and_extract(policy_pdf(1024))
        .await
        .expect("workflow");
    workflow
        .edit_field(PolicyField::PolicyType, "Motor")
        .expect("edit");

    let stage = workflow.submit_draft().await.expect("verify");
    assert_eq!(stage, Stage::Verify);
    assert_eq!(
        workflow.state().error_message.as_deref(),
        Some("Verification failed")
    );
    assert!(workflow.state().verification_result.is_none());
    assert!(workflow
        .draft()
        .expect("draft kept")
        .edited
        .contains(PolicyField::PolicyType));

    *gateway.verify.lock().expect("lock") = Some(Ok(accuracy(90.0, 10, 1)));
    let stage = workflow.submit_draft().await.expect("retry");
    assert_eq!(stage, Stage::Complete);
    assert!(workflow.state().error_message.is_none());

    let requests = gateway.verify_requests.lock().expect("lock").clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
}

#[tokio::test]
async fn reset_from_every_stage_clears_all_derived_state() {
    let gateway = Arc::new(
        ScriptedGateway::default()
            .with_upload(Ok(uploaded("f1", "policy.pdf")))
            .with_extract(Ok(jane_doe_extraction()))
            .with_verify(Ok(accuracy(100.0, 10, 0))),
    );

    let mut workflow = controller(&gateway);
    workflow.reset();
    assert_pristine(workflow.state());

    workflow.submit_upload(policy_pdf(10)).await.expect("upload");
    assert_eq!(workflow.stage(), Stage::Extracting);
    workflow.reset();
    assert_pristine(workflow.state());

    workflow
        .upload_and_extract(policy_pdf(10))
        .await
        .expect("workflow");
    workflow
        .edit_field(PolicyField::Contact, "555-0100")
        .expect("edit");
    assert_eq!(workflow.stage(), Stage::Verify);
    workflow.reset();
    assert_pristine(workflow.state());
    assert!(workflow.draft().is_none());

    workflow
        .upload_and_extract(policy_pdf(10))
        .await
        .expect("workflow");
    assert!(workflow.draft().expect("fresh draft").edited.is_empty());
    workflow.submit_draft().await.expect("verify");
    assert_eq!(workflow.stage(), Stage::Complete);
    workflow.reset();
    assert_pristine(workflow.state());
}

#[tokio::test]
async fn late_extraction_result_after_reset_is_ignored() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Ok(uploaded("f1", "policy.pdf"))));
    let mut workflow = controller(&gateway);
    workflow.submit_upload(policy_pdf(10)).await.expect("upload");

    let ticket = workflow.begin_extraction().expect("ticket");
    assert_eq!(ticket.file_id(), &FileId::from("f1"));
    assert_eq!(
        workflow.begin_extraction(),
        Err(WorkflowError::ExtractionInFlight)
    );

    workflow.reset();
    let stage = workflow.complete_extraction(ticket, Ok(jane_doe_extraction()));
    assert_eq!(stage, Stage::Upload);
    assert_pristine(workflow.state());
}

#[tokio::test]
async fn stale_ticket_does_not_leak_into_a_new_session() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Ok(uploaded("f1", "policy.pdf"))));
    let mut workflow = controller(&gateway);
    workflow.submit_upload(policy_pdf(10)).await.expect("upload");
    let stale = workflow.begin_extraction().expect("ticket");

    workflow.reset();
    workflow.submit_upload(policy_pdf(10)).await.expect("upload");
    let current = workflow.begin_extraction().expect("ticket");

    let stage = workflow.complete_extraction(
        stale,
        Err(GatewayError::new(FailureKind::Timeout, "timeout")),
    );
    assert_eq!(stage, Stage::Extracting);
    assert!(workflow.state().error_message.is_none());

    let stage = workflow.complete_extraction(current, Ok(jane_doe_extraction()));
    assert_eq!(stage, Stage::Verify);
}

#[tokio::test]
async fn duplicate_ticket_from_failed_attempt_is_ignored_after_reupload() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Ok(uploaded("f1", "first.pdf"))));
    let mut workflow = controller(&gateway);
    workflow.submit_upload(policy_pdf(10)).await.expect("upload");

    let first = workflow.begin_extraction().expect("ticket");
    let duplicate = ExtractionTicket {
        epoch: first.epoch,
        attempt: first.attempt,
        file_id: first.file_id.clone(),
    };
    let stage = workflow.complete_extraction(
        first,
        Err(GatewayError::new(FailureKind::Timeout, "timeout")),
    );
    assert_eq!(stage, Stage::Upload);

    *gateway.upload.lock().expect("lock") = Some(Ok(uploaded("f2", "second.pdf")));
    workflow.submit_upload(policy_pdf(10)).await.expect("upload");
    let second = workflow.begin_extraction().expect("ticket");
    assert_eq!(second.file_id(), &FileId::from("f2"));

    let stage = workflow.complete_extraction(duplicate, Ok(jane_doe_extraction()));
    assert_eq!(stage, Stage::Extracting);
    assert!(workflow.state().extracted_data.is_none());
    assert!(workflow.draft().is_none());
    assert_eq!(workflow.state().file_id, FileId::from("f2"));

    let stage = workflow.complete_extraction(second, Ok(jane_doe_extraction()));
    assert_eq!(stage, Stage::Verify);
}

#[tokio::test]
async fn ticket_for_another_file_is_ignored() {
    let gateway = Arc::new(ScriptedGateway::default().with_upload(Ok(uploaded("f2", "policy.pdf"))));
    let mut workflow = controller(&gateway);
    workflow.submit_upload(policy_pdf(10)).await.expect("upload");
    let current = workflow.begin_extraction().expect("ticket");

    let foreign = ExtractionTicket {
        epoch: current.epoch,
        attempt: current.attempt,
        file_id: FileId::from("f1"),
    };
    let stage = workflow.complete_extraction(foreign, Ok(jane_doe_extraction()));
    assert_eq!(stage, Stage::Extracting);
    assert!(workflow.state().extracted_data.is_none());

    let stage = workflow.complete_extraction(current, Ok(jane_doe_extraction()));
    assert_eq!(stage, Stage::Verify);
}

#[tokio::test]
async fn operations_in_the_wrong_stage_are_rejected_without_side_effects() {
    let gateway = Arc::new(ScriptedGateway::default());
    let mut workflow = controller(&gateway);

    assert_eq!(
        workflow.run_extraction().await,
        Err(WorkflowError::WrongStage {
            operation: "run_extraction",
            expected: Stage::Extracting,
            actual: Stage::Upload,
        })
    );
    assert!(matches!(
        workflow.edit_field(PolicyField::PolicyNumber, "x"),
        Err(WorkflowError::WrongStage { .. })
    ));
    assert!(matches!(
        workflow.submit_draft().await,
        Err(WorkflowError::WrongStage { .. })
    ));
    assert!(gateway.verify_requests.lock().expect("lock").is_empty());
    assert_pristine(workflow.state());
}

#[test]
fn edits_accumulate_monotonically() {
    let mut draft = VerificationDraft::seed(&jane_doe_extraction().data);
    draft.edit(PolicyField::PolicyHolder, "Jane Q. Doe");
    draft.edit(PolicyField::PolicyHolder, "Jane Doe");
    draft.edit(PolicyField::ExpiringDate, "01/01/2026");

    assert_eq!(draft.edited.len(), 2);
    assert_eq!(
        draft.edited.field_names(),
        vec!["policy_holder".to_string(), "expiring_date".to_string()]
    );
    assert_eq!(draft.record.get(PolicyField::PolicyHolder), Some("Jane Doe"));
}
