//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::notify::Notification;
use crate::store::Model;
use crate::transform::ImportOutcome;

/// Response sent after an import request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "completed", "rejected", "cancelled" or "rolled_back"
    pub status: String,

    pub outcome: ImportOutcome,

    /// Notifications emitted while importing
    pub notifications: Vec<Notification>,

    pub metadata: ImportMetadata,
}

/// What was imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMetadata {
    pub file_name: Option<String>,
    pub model: String,
    pub bytes: usize,
}

impl ImportResponse {
    pub fn new(outcome: ImportOutcome, notifications: Vec<Notification>, metadata: ImportMetadata) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: outcome_status(&outcome).to_string(),
            outcome,
            notifications,
            metadata,
        }
    }
}

/// Records of a model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub model: String,
    pub count: usize,
    pub records: Vec<Model>,
}

fn outcome_status(outcome: &ImportOutcome) -> &'static str {
    match outcome {
        ImportOutcome::Completed(_) => "completed",
        ImportOutcome::Rejected { .. } => "rejected",
        ImportOutcome::Cancelled => "cancelled",
        ImportOutcome::RolledBack(_) => "rolled_back",
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "notifications": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImportSummary;

    #[test]
    fn test_response_status() {
        let metadata = ImportMetadata { file_name: Some("users.csv".into()), model: "users".into(), bytes: 12 };
        let response = ImportResponse::new(
            ImportOutcome::Completed(ImportSummary::new(3)),
            vec![Notification::success("Import succeeded", "3 rows imported, 0 skipped.")],
            metadata,
        );

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["outcome"]["processed"], 3);
        assert_eq!(value["notifications"][0]["severity"], "success");
        assert_eq!(value["metadata"]["fileName"], "users.csv");
    }

    #[test]
    fn test_error_response() {
        let value = error_response("No file provided");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "No file provided");
    }
}
