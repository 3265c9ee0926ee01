use serde::{Deserialize, Serialize};

use crate::services::tabular::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Analyzing,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// 1-based display index that counts the header row; `0` for missing columns.
    pub row_index: usize,
    pub column_name: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(row_index: usize, column_name: &str, message: impl Into<String>) -> Self {
        Self {
            row_index,
            column_name: column_name.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub time_period: String,
    pub data_points: usize,
    pub channels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationError>>,
    pub summary: AnalysisSummary,
    pub preview: Vec<Row>,
    pub columns: Vec<String>,
}
