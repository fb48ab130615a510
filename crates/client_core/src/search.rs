//! Lookup of previously verified records by holder, registration or expiry.

use serde_json::Value;
use shared::{
    error::GatewayError,
    protocol::{SearchQuery, SearchRecord},
};
use tracing::{info, warn};

use crate::RecordSearch;

pub const NO_RECORDS_MESSAGE: &str = "No records found.";
pub const SEARCH_FAILED_MESSAGE: &str = "Search failed. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Records(Vec<SearchRecord>),
    NoRecords,
}

impl SearchOutcome {
    pub fn records(&self) -> &[SearchRecord] {
        match self {
            SearchOutcome::Records(records) => records,
            SearchOutcome::NoRecords => &[],
        }
    }
}

/// Runs a search. An empty result is not an error; transport failures are
/// reduced to a single retry-later message.
pub async fn run_search(
    search: &dyn RecordSearch,
    query: &SearchQuery,
) -> Result<SearchOutcome, GatewayError> {
    match search.search(query).await {
        Ok(records) if records.is_empty() => {
            info!("search returned no records");
            Ok(SearchOutcome::NoRecords)
        }
        Ok(records) => {
            info!(count = records.len(), "search returned records");
            Ok(SearchOutcome::Records(records))
        }
        Err(err) => {
            warn!(kind = ?err.kind, "search failed: {}", err.message);
            Err(GatewayError::new(err.kind, SEARCH_FAILED_MESSAGE))
        }
    }
}

/// Anything other than a JSON array of objects is treated as no records.
pub(crate) fn records_from_value(body: Value) -> Vec<SearchRecord> {
    let Value::Array(rows) = body else {
        return Vec::new();
    };

    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(columns) => Some(
                columns
                    .into_iter()
                    .map(|(column, value)| (column, cell_text(value)))
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
