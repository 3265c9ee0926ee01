//! Upload analysis: parse the user's latest file, check it, summarize it,
//! and record the outcome on the onboarding record.

pub mod summarizer;
pub mod types;
pub mod validator;

use std::path::Path;
use std::sync::Arc;

pub use types::{AnalysisResult, AnalysisStatus, AnalysisSummary, ValidationError};

use crate::error::AppError;
use crate::models::{DataStatus, UploadedFile, UserId};
use crate::services::store::{OnboardingStore, StoreError};
use crate::services::tabular::{FileFormat, TabularParser};

/// Parser -> validator -> summarizer over bytes already in memory.
pub fn analyze_bytes(data: &[u8], format: FileFormat) -> AnalysisResult {
    let table = TabularParser.parse(data, format);
    let outcome = validator::validate(&table);
    summarizer::summarize(table, outcome)
}

/// Reads the stored upload; the file handle is released before parsing starts.
pub fn analyze_file(path: &Path, format: FileFormat) -> Result<AnalysisResult, AppError> {
    let data = std::fs::read(path).map_err(|e| {
        tracing::error!("Failed to read upload {}: {}", path.display(), e);
        AppError::IoError(e)
    })?;
    tracing::info!("Read {}KB from {}", data.len() / 1024, path.display());
    Ok(analyze_bytes(&data, format))
}

/// Runs analysis on the most recent upload for `user_id` and persists the
/// resulting status as the record's `dataStatus`.
pub async fn analyze_latest_upload(
    store: &Arc<dyn OnboardingStore>,
    user_id: &UserId,
) -> Result<AnalysisResult, AppError> {
    let start = std::time::Instant::now();

    let upload: UploadedFile = store
        .get(user_id)?
        .and_then(|record| record.latest_upload().cloned())
        .ok_or_else(|| AppError::NoUploadedFile(user_id.to_string()))?;

    tracing::info!(
        "Starting analysis for user: {}, file: {} ({:?})",
        user_id,
        upload.file_name,
        upload.format
    );

    let mut previous_status = None;
    store.update(user_id, &mut |record| {
        previous_status = record.data_status;
        record
            .set_data_status(DataStatus::Analyzing)
            .map_err(StoreError::Conflict)
    })?;

    let path = upload.stored_path.clone();
    let format = upload.format;
    let analysis = tokio::task::spawn_blocking(move || analyze_file(Path::new(&path), format))
        .await
        .map_err(|e| AppError::Internal(format!("Analysis task failed: {}", e)))
        .and_then(|result| result);

    let result = match analysis {
        Ok(result) => result,
        Err(e) => {
            store.update(user_id, &mut |record| {
                record.abandon_analysis(previous_status);
                Ok(())
            })?;
            return Err(e);
        }
    };

    store.update(user_id, &mut |record| {
        record
            .set_data_status(result.status.into())
            .map_err(StoreError::Conflict)
    })?;

    tracing::info!(
        "Analysis for user {} finished with {:?}: {} rows, {} errors in {:?}",
        user_id,
        result.status,
        result.summary.data_points,
        result.errors.as_ref().map_or(0, Vec::len),
        start.elapsed()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    const VALID_CSV: &str = "Date,Channel,Campaign,Spend\n\
        2024-01-01,Search,Brand,100\n\
        2024-01-02,Social,Launch,\"$1,250.00\"\n\
        2024-01-03,Search,Retargeting,75.5\n";

    fn user() -> UserId {
        UserId::parse("analyst").unwrap()
    }

    fn store_with_upload(path: &Path, format: FileFormat) -> Arc<dyn OnboardingStore> {
        let store: Arc<dyn OnboardingStore> = Arc::new(InMemoryStore::new());
        store
            .update(&user(), &mut |record| {
                record.uploaded_files.push(UploadedFile {
                    file_name: "spend.csv".into(),
                    media_type: Some("text/csv".into()),
                    format,
                    size_bytes: 0,
                    stored_path: path.display().to_string(),
                    uploaded_at: Utc::now(),
                });
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn valid_file_succeeds() {
        let result = analyze_bytes(VALID_CSV.as_bytes(), FileFormat::Csv);

        assert_eq!(result.status, AnalysisStatus::Success);
        assert!(result.errors.is_none());
        assert_eq!(result.summary.data_points, 3);
        assert_eq!(result.summary.channels, 2);
        assert_eq!(result.preview.len(), 3);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("errors").is_none());
        assert_eq!(json["summary"]["dataPoints"], 3);
        assert_eq!(json["preview"][1]["Spend"], "$1,250.00");
    }

    #[test]
    fn missing_spend_column_short_circuits() {
        let csv = "Date,Channel,Campaign\n2024-01-01,Search!!,Brand\n";
        let result = analyze_bytes(csv.as_bytes(), FileFormat::Csv);

        assert_eq!(result.status, AnalysisStatus::Error);
        let errors = result.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_index, 0);
        assert_eq!(errors[0].column_name, "spend");
        assert!(errors[0].message.contains("missing"));
        assert_eq!(result.preview.len(), 1);
    }

    #[test]
    fn invalid_spend_in_third_row() {
        let csv = "Date,Channel,Campaign,Spend\n\
            2024-01-01,Search,Brand,1\n\
            2024-01-02,Search,Brand,2\n\
            2024-01-03,Search,Brand,abc\n";
        let result = analyze_bytes(csv.as_bytes(), FileFormat::Csv);

        assert_eq!(
            result.errors,
            Some(vec![ValidationError::new(
                4,
                "Spend",
                validator::INVALID_SPEND
            )])
        );
    }

    #[test]
    fn unreadable_spreadsheet_reports_all_required_columns() {
        let result = analyze_bytes(b"PK\x03\x04 truncated", FileFormat::Xlsx);
        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.errors.map(|e| e.len()), Some(4));
        assert!(result.columns.is_empty());
        assert_eq!(result.summary.data_points, 0);
    }

    #[test]
    fn workbook_upload_runs_full_pipeline() {
        use crate::services::tabular::fixtures::{xlsx, XCell};

        let data = xlsx(&[
            (
                "Q1",
                &[
                    &[XCell::Text("date"), XCell::Text("Channel"), XCell::Text("Campaign"), XCell::Text("Spend")],
                    &[XCell::Date(45292.0), XCell::Text("Search"), XCell::Text("Brand"), XCell::Number(100.0)],
                    &[XCell::Date(45293.0), XCell::Text("TV"), XCell::Text("Launch"), XCell::Number(250.0)],
                ],
            ),
            ("Raw", &[&[XCell::Text("Nothing")], &[XCell::Number(1.0)]]),
        ]);

        let result = analyze_bytes(&data, FileFormat::Xlsx);

        assert_eq!(result.status, AnalysisStatus::Success);
        assert!(result.errors.is_none());
        assert_eq!(result.summary.data_points, 2);
        assert_eq!(result.summary.channels, 2);
        assert_eq!(result.columns, vec!["date", "Channel", "Campaign", "Spend"]);

        let json = serde_json::to_value(&result.preview).unwrap();
        assert_eq!(json[0]["date"], "2024-01-01");
        assert_eq!(json[1]["Channel"], "TV");
    }

    #[test]
    fn latin1_csv_still_validates() {
        let result = analyze_bytes(
            b"Date,Channel,Campaign,Spend\n2024-01-01,Search,Caf\xE9,20\n",
            FileFormat::Csv,
        );
        assert_eq!(result.status, AnalysisStatus::Success);
        assert_eq!(result.summary.data_points, 1);
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let first = analyze_bytes(VALID_CSV.as_bytes(), FileFormat::Csv);
        let second = analyze_bytes(VALID_CSV.as_bytes(), FileFormat::Csv);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn persists_status_of_latest_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, "Date,Channel,Campaign,Spend\n,Search,Brand,5\n").unwrap();
        let store = store_with_upload(&path, FileFormat::Csv);

        let result = assert_ok!(analyze_latest_upload(&store, &user()).await);
        assert_eq!(result.status, AnalysisStatus::Error);
        let record = store.get(&user()).unwrap().unwrap();
        assert_eq!(record.data_status, Some(DataStatus::Error));

        std::fs::write(&path, VALID_CSV).unwrap();
        let result = assert_ok!(analyze_latest_upload(&store, &user()).await);
        assert_eq!(result.status, AnalysisStatus::Success);
        let record = store.get(&user()).unwrap().unwrap();
        assert_eq!(record.data_status, Some(DataStatus::Success));
    }

    #[tokio::test]
    async fn no_upload_fails_before_parsing() {
        let store: Arc<dyn OnboardingStore> = Arc::new(InMemoryStore::new());
        let err = assert_err!(analyze_latest_upload(&store, &user()).await);
        assert!(matches!(err, AppError::NoUploadedFile(_)));
        assert!(store.get(&user()).unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_restores_previous_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_upload(&dir.path().join("gone.csv"), FileFormat::Csv);

        let err = analyze_latest_upload(&store, &user()).await.unwrap_err();
        assert!(matches!(err, AppError::IoError(_)));
        assert_eq!(store.get(&user()).unwrap().unwrap().data_status, None);
    }

    #[tokio::test]
    async fn missing_file_keeps_earlier_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_upload(&dir.path().join("gone.csv"), FileFormat::Csv);
        store
            .update(&user(), &mut |record| {
                record.data_status = Some(DataStatus::Error);
                Ok(())
            })
            .unwrap();

        assert_err!(analyze_latest_upload(&store, &user()).await);
        assert_eq!(
            store.get(&user()).unwrap().unwrap().data_status,
            Some(DataStatus::Error)
        );
    }
}
