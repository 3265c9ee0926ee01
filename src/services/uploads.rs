use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::AppError;
use crate::models::{UploadedFile, UserId};
use crate::services::tabular::FileFormat;

/// Writes accepted uploads to disk. Earlier uploads are kept; the record's
/// last entry is the one analysis runs against.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    dir: PathBuf,
    max_bytes: usize,
    sequence: Arc<AtomicU64>,
}

impl UploadStorage {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn save(
        &self,
        user_id: &UserId,
        file_name: &str,
        media_type: Option<&str>,
        data: Bytes,
    ) -> Result<UploadedFile, AppError> {
        let format = FileFormat::detect(media_type, file_name).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Unsupported file type for '{}': only CSV, XLSX and XLS files are accepted",
                file_name
            ))
        })?;

        if data.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File is {} bytes, limit is {} bytes",
                data.len(),
                self.max_bytes
            )));
        }

        let now = Utc::now();
        tokio::fs::create_dir_all(&self.dir).await?;
        let (path, mut file) = self
            .create_unique(user_id, now.timestamp_millis(), format)
            .await?;
        file.write_all(&data).await?;
        file.flush().await?;
        tracing::info!(
            "Stored upload {} for user {} at {} ({}KB)",
            file_name,
            user_id,
            path.display(),
            data.len() / 1024
        );

        Ok(UploadedFile {
            file_name: file_name.to_string(),
            media_type: media_type.map(str::to_string),
            format,
            size_bytes: data.len() as u64,
            stored_path: path.display().to_string(),
            uploaded_at: now,
        })
    }

    /// Different user ids can clean to the same stem, so every name also
    /// carries a sequence number and is created with `create_new`.
    async fn create_unique(
        &self,
        user_id: &UserId,
        millis: i64,
        format: FileFormat,
    ) -> Result<(PathBuf, File), AppError> {
        let stem = clean_file_stem(user_id.as_str());
        loop {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let path = self
                .dir
                .join(format!("{}_{}_{}.{}", stem, millis, seq, format.extension()));

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!("Upload path {} taken, trying next", path.display());
                }
                Err(e) => return Err(AppError::IoError(e)),
            }
        }
    }
}

fn clean_file_stem(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
