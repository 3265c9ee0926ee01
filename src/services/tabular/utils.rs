use std::collections::HashSet;

use calamine::{Data, DataType};
use chrono::Timelike;

use super::types::CellValue;

/// Header used for spreadsheet columns whose header cell is blank.
pub const EMPTY_HEADER: &str = "__EMPTY";

/// Keeps header names as written but makes repeats distinct with a numeric suffix.
pub fn unique_column_name(name: &str, existing_names: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();

    let mut counter = 1;
    while !existing_names.insert(candidate.clone()) {
        candidate = format!("{}_{}", name, counter);
        counter += 1;
    }

    candidate
}

pub fn header_name(cell: &Data) -> String {
    match cell {
        Data::Empty => EMPTY_HEADER.to_string(),
        Data::String(s) if s.is_empty() => EMPTY_HEADER.to_string(),
        other => cell_value(other).render(),
    }
}

pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from_text(s),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0 => {
                CellValue::Text(dt.format("%Y-%m-%d").to_string())
            }
            Some(dt) => CellValue::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => CellValue::from_text(&cell.to_string()),
        },
        other => CellValue::from_text(&other.to_string()),
    }
}
