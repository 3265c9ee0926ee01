use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;

use super::types::ValidationError;
use crate::services::tabular::{CellValue, Row, Table};

pub const REQUIRED_COLUMNS: [&str; 4] = ["date", "channel", "campaign", "spend"];

pub const MISSING_DATE: &str = "Missing date value";
pub const MISSING_SPEND: &str = "Missing spend value";
pub const INVALID_SPEND: &str = "Invalid spend format (must be numeric)";
pub const CHANNEL_SPECIAL_CHARS: &str = "Channel name contains special characters";

static CHANNEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 _-]*$").expect("channel pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
    pub row_checks_ran: bool,
}

/// Actual column names that satisfy each semantic role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedColumns<'a> {
    pub date: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub campaign: Option<&'a str>,
    pub spend: Option<&'a str>,
}

impl<'a> ResolvedColumns<'a> {
    pub fn resolve(columns: &'a [String]) -> Self {
        let find = |required: &str| {
            columns
                .iter()
                .find(|c| matches_required(c, required))
                .map(String::as_str)
        };

        Self {
            date: find("date"),
            channel: find("channel"),
            campaign: find("campaign"),
            spend: columns
                .iter()
                .find(|c| matches_required(c, "spend") || c.to_lowercase().contains("cost"))
                .map(String::as_str),
        }
    }
}

/// Case-insensitive match; the only separator variant tried is `_` read as a space.
pub fn matches_required(actual: &str, required: &str) -> bool {
    let lowered = actual.to_lowercase();
    lowered == required || lowered == required.replace('_', " ")
}

pub fn missing_columns(columns: &[String]) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| matches_required(c, required)))
        .collect()
}

pub fn validate(table: &Table) -> ValidationOutcome {
    let missing = missing_columns(&table.columns);
    if !missing.is_empty() {
        tracing::info!("Missing required columns: {:?}", missing);
        return ValidationOutcome {
            errors: missing
                .into_iter()
                .map(|column| {
                    ValidationError::new(0, column, format!("Required column '{}' is missing", column))
                })
                .collect(),
            row_checks_ran: false,
        };
    }

    let resolved = ResolvedColumns::resolve(&table.columns);
    let errors: Vec<ValidationError> = table
        .rows
        .iter()
        .enumerate()
        .flat_map(|(i, row)| check_row(row, i + 2, &resolved))
        .collect();

    tracing::debug!(
        "Row checks finished: {} rows, {} errors",
        table.rows.len(),
        errors.len()
    );

    ValidationOutcome {
        errors,
        row_checks_ran: true,
    }
}

fn check_row(row: &Row, row_index: usize, columns: &ResolvedColumns<'_>) -> SmallVec<[ValidationError; 3]> {
    let mut errors = SmallVec::new();

    if let Some(date_col) = columns.date {
        if is_missing(row.get(date_col)) {
            errors.push(ValidationError::new(row_index, date_col, MISSING_DATE));
        }
    }

    if let Some(spend_col) = columns.spend {
        match row.get(spend_col) {
            value if is_missing(value) => {
                errors.push(ValidationError::new(row_index, spend_col, MISSING_SPEND));
            }
            Some(value) if !is_numeric_spend(value) => {
                errors.push(ValidationError::new(row_index, spend_col, INVALID_SPEND));
            }
            _ => {}
        }
    }

    if let Some(channel_col) = columns.channel {
        if let Some(channel) = row.get(channel_col).and_then(CellValue::as_text) {
            if !CHANNEL_NAME.is_match(channel) {
                errors.push(ValidationError::new(row_index, channel_col, CHANNEL_SPECIAL_CHARS));
            }
        }
    }

    errors
}

fn is_missing(value: Option<&CellValue>) -> bool {
    value.map_or(true, CellValue::is_empty)
}

/// Currency symbols and thousands separators are ignored; the remainder must be a finite number.
pub fn is_numeric_spend(value: &CellValue) -> bool {
    match value {
        CellValue::Number(n) => n.is_finite(),
        CellValue::Text(raw) => {
            let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
            let cleaned = cleaned.trim();
            !cleaned.is_empty() && cleaned.parse::<f64>().map_or(false, f64::is_finite)
        }
        CellValue::Empty => false,
    }
}
