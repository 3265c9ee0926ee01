use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;
use crate::services::analysis::AnalysisStatus;
use crate::services::tabular::FileFormat;

const MAX_USER_ID_LEN: usize = 128;

/// Identifier every onboarding operation is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_USER_ID_LEN {
            return Err(AppError::InvalidInput(format!(
                "User id must be between 1 and {} characters",
                MAX_USER_ID_LEN
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        {
            return Err(AppError::InvalidInput(format!("Invalid user id: {}", trimmed)));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of the data stage: `analyzing -> success | error`,
/// re-runs go back to `analyzing`, and only `success` can be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    Analyzing,
    Success,
    Error,
    Complete,
}

impl DataStatus {
    pub fn can_transition(from: Option<DataStatus>, to: DataStatus) -> bool {
        use DataStatus::*;
        matches!(
            (from, to),
            (None | Some(Analyzing | Success | Error), Analyzing)
                | (Some(Analyzing), Success | Error)
                | (Some(Success), Complete)
        )
    }
}

impl From<AnalysisStatus> for DataStatus {
    fn from(status: AnalysisStatus) -> Self {
        match status {
            AnalysisStatus::Analyzing => DataStatus::Analyzing,
            AnalysisStatus::Success => DataStatus::Success,
            AnalysisStatus::Error => DataStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub media_type: Option<String>,
    pub format: FileFormat,
    pub size_bytes: u64,
    pub stored_path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConnection {
    pub platform: String,
    pub account_id: Option<String>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeatherMetric {
    Temperature,
    Precipitation,
    Humidity,
    WindSpeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EconomicIndicator {
    ConsumerConfidence,
    Unemployment,
    Inflation,
    Gdp,
    InterestRates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomValueType {
    Nominal,
    Numeric,
    Binary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherSettings {
    pub locations: Vec<String>,
    pub metrics: Vec<WeatherMetric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HolidaySettings {
    pub country: String,
    pub include_regional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MajorEventSettings {
    pub categories: Vec<String>,
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EconomicIndicatorSettings {
    pub indicators: Vec<EconomicIndicator>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetitorSettings {
    pub competitors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFactor {
    pub name: String,
    pub value_type: CustomValueType,
}

/// External factor selected in the wizard, each kind with its own settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExternalFactor {
    Weather(WeatherSettings),
    Holidays(HolidaySettings),
    MajorEvents(MajorEventSettings),
    EconomicIndicators(EconomicIndicatorSettings),
    CompetitorCampaigns(CompetitorSettings),
    Custom(CustomFactor),
}

impl ExternalFactor {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            ExternalFactor::Holidays(settings) if settings.country.trim().is_empty() => Err(
                AppError::InvalidInput("Holiday factor requires a country".to_string()),
            ),
            ExternalFactor::Custom(factor) if factor.name.trim().is_empty() => Err(
                AppError::InvalidInput("Custom factor requires a name".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Answers accumulated across the wizard for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRecord {
    /// Assigned by the store on first write.
    pub id: Option<u64>,
    pub user_id: UserId,
    pub kpis: Vec<String>,
    pub connections: Vec<DataSourceConnection>,
    pub uploaded_files: Vec<UploadedFile>,
    pub data_status: Option<DataStatus>,
    pub external_factors: Vec<ExternalFactor>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingRecord {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id,
            kpis: Vec::new(),
            connections: Vec::new(),
            uploaded_files: Vec::new(),
            data_status: None,
            external_factors: Vec::new(),
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn latest_upload(&self) -> Option<&UploadedFile> {
        self.uploaded_files.last()
    }

    /// Appends a new upload. The previous analysis no longer describes the
    /// latest file, so the data status is cleared until analysis runs again.
    pub fn record_upload(&mut self, file: UploadedFile) -> Result<(), String> {
        if self.data_status == Some(DataStatus::Complete) {
            return Err("onboarding is already confirmed; uploads are closed".to_string());
        }
        self.uploaded_files.push(file);
        self.data_status = None;
        Ok(())
    }

    /// Puts back the status seen before an analysis that could not finish,
    /// unless something else has already moved the record on.
    pub fn abandon_analysis(&mut self, previous: Option<DataStatus>) {
        if self.data_status == Some(DataStatus::Analyzing) {
            self.data_status = previous;
        }
    }

    pub fn set_data_status(&mut self, to: DataStatus) -> Result<(), String> {
        if !DataStatus::can_transition(self.data_status, to) {
            return Err(format!(
                "cannot move data status from {:?} to {:?}",
                self.data_status, to
            ));
        }
        self.data_status = Some(to);
        Ok(())
    }
}
