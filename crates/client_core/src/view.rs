//! Pure rendering of the workflow state for the terminal front end.

use std::fmt;

use shared::{
    dates::format_for_display,
    domain::{PolicyField, Stage, TRACKABLE_FIELD_COUNT},
};

use crate::workflow::{VerificationDraft, WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    AiExtracted,
    Edited,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub field: PolicyField,
    pub label: &'static str,
    pub value: String,
    pub status: FieldStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyRating {
    Excellent,
    Good,
    Partial,
}

impl AccuracyRating {
    pub const EXCELLENT_THRESHOLD: f64 = 80.0;
    pub const GOOD_THRESHOLD: f64 = 60.0;

    pub fn from_score(accuracy_score: f64) -> Self {
        if accuracy_score >= Self::EXCELLENT_THRESHOLD {
            AccuracyRating::Excellent
        } else if accuracy_score >= Self::GOOD_THRESHOLD {
            AccuracyRating::Good
        } else {
            AccuracyRating::Partial
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            AccuracyRating::Excellent => "Excellent performance!",
            AccuracyRating::Good => "Good performance.",
            AccuracyRating::Partial => "Partial extraction.",
        }
    }

    pub fn detail(self) -> &'static str {
        match self {
            AccuracyRating::Excellent => {
                "The AI successfully extracted most fields automatically."
            }
            AccuracyRating::Good => {
                "The AI extracted a majority of fields with some manual corrections needed."
            }
            AccuracyRating::Partial => {
                "This document may have complex formatting or missing information."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryView {
    pub accuracy_score: f64,
    pub rating: AccuracyRating,
    pub total_fields: u32,
    pub edited_fields_count: u32,
    pub extracted_fields_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageView {
    Upload {
        error: Option<String>,
    },
    Extracting {
        filename: String,
    },
    Verify {
        fields: Vec<FieldView>,
        populated: usize,
        total: usize,
        error: Option<String>,
    },
    Complete {
        summary: SummaryView,
    },
}

impl StageView {
    /// Share of trackable fields that carry a value, rounded to a whole percent.
    pub fn populated_percent(&self) -> Option<u32> {
        match self {
            StageView::Verify {
                populated, total, ..
            } if *total > 0 => Some(((populated * 100 + total / 2) / total) as u32),
            _ => None,
        }
    }
}

pub fn render(state: &WorkflowState, draft: Option<&VerificationDraft>) -> StageView {
    match state.stage {
        Stage::Upload => StageView::Upload {
            error: state.error_message.clone(),
        },
        Stage::Extracting => StageView::Extracting {
            filename: state.filename.clone(),
        },
        Stage::Verify => {
            let Some(extraction) = state.extracted_data.as_ref() else {
                return StageView::Upload {
                    error: state.error_message.clone(),
                };
            };
            let record = draft.map_or(&extraction.data, |d| &d.record);
            let fields: Vec<FieldView> = PolicyField::trackable()
                .map(|field| {
                    let edited = draft.is_some_and(|d| d.edited.contains(field));
                    let status = if edited {
                        FieldStatus::Edited
                    } else if record.is_populated(field) {
                        FieldStatus::AiExtracted
                    } else {
                        FieldStatus::Missing
                    };
                    FieldView {
                        field,
                        label: field.label(),
                        value: record.get(field).unwrap_or_default().to_string(),
                        status,
                    }
                })
                .collect();
            StageView::Verify {
                populated: record.populated_trackable_count(),
                total: TRACKABLE_FIELD_COUNT,
                fields,
                error: state.error_message.clone(),
            }
        }
        Stage::Complete => match state.verification_result.as_ref() {
            Some(result) => StageView::Complete {
                summary: SummaryView {
                    accuracy_score: result.accuracy_score,
                    rating: AccuracyRating::from_score(result.accuracy_score),
                    total_fields: result.total_fields,
                    edited_fields_count: result.edited_fields_count,
                    extracted_fields_count: result.extracted_fields_count(),
                },
            },
            None => StageView::Upload {
                error: state.error_message.clone(),
            },
        },
    }
}

impl fmt::Display for StageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageView::Upload { error } => {
                writeln!(f, "Upload a policy PDF (max 10MB).")?;
                if let Some(error) = error {
                    writeln!(f, "Error: {error}")?;
                }
                Ok(())
            }
            StageView::Extracting { filename } => {
                writeln!(f, "Extracting policy data from {filename}...")
            }
            StageView::Verify {
                fields,
                populated,
                total,
                error,
            } => {
                writeln!(
                    f,
                    "AI Extracted: {populated}/{total} fields ({}%)",
                    self.populated_percent().unwrap_or_default()
                )?;
                for view in fields {
                    let value = if view.field.is_date() {
                        format_for_display(Some(&view.value))
                    } else if view.value.is_empty() {
                        "-".to_string()
                    } else {
                        view.value.clone()
                    };
                    let marker = match view.status {
                        FieldStatus::AiExtracted => "AI Extracted",
                        FieldStatus::Edited => "Edited",
                        FieldStatus::Missing => "Not extracted - please fill in manually",
                    };
                    writeln!(f, "  {:<16} {:<32} [{marker}]", view.label, value)?;
                }
                if let Some(error) = error {
                    writeln!(f, "Error: {error}")?;
                }
                Ok(())
            }
            StageView::Complete { summary } => {
                writeln!(f, "Verification complete.")?;
                writeln!(f, "  Accuracy score:   {:.0}%", summary.accuracy_score.round())?;
                writeln!(f, "  Total fields:     {}", summary.total_fields)?;
                writeln!(f, "  AI extracted:     {}", summary.extracted_fields_count)?;
                writeln!(f, "  Manually edited:  {}", summary.edited_fields_count)?;
                writeln!(f, "{} {}", summary.rating.headline(), summary.rating.detail())
            }
        }
    }
}
