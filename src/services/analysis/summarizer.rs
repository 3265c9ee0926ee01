use std::collections::HashSet;

use super::types::{AnalysisResult, AnalysisStatus, AnalysisSummary};
use super::validator::{ResolvedColumns, ValidationOutcome};
use crate::services::tabular::Table;

pub const PREVIEW_ROWS: usize = 5;

// TODO: derive the range from the resolved date column once date formats are normalized.
pub const TIME_PERIOD_PLACEHOLDER: &str = "Last 12 months";

pub fn summarize(table: Table, outcome: ValidationOutcome) -> AnalysisResult {
    let channels = distinct_channels(&table);
    let data_points = table.row_count();

    let (status, errors) = if outcome.errors.is_empty() {
        (AnalysisStatus::Success, None)
    } else {
        (AnalysisStatus::Error, Some(outcome.errors))
    };

    let Table { mut rows, columns } = table;
    rows.truncate(PREVIEW_ROWS);

    AnalysisResult {
        status,
        errors,
        summary: AnalysisSummary {
            time_period: TIME_PERIOD_PLACEHOLDER.to_string(),
            data_points,
            channels,
        },
        preview: rows,
        columns,
    }
}

fn distinct_channels(table: &Table) -> usize {
    let Some(channel_col) = ResolvedColumns::resolve(&table.columns).channel else {
        return 0;
    };

    table
        .rows
        .iter()
        .filter_map(|row| row.get(channel_col))
        .filter(|value| !value.is_empty())
        .map(|value| value.render())
        .collect::<HashSet<_>>()
        .len()
}
