use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{Cursor, Read, Seek};

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use thiserror::Error;

use super::types::{CellValue, FileFormat, Row, Table};
use super::utils::{cell_value, header_name, unique_column_name};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
enum ParseError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("xlsx: {0}")]
    Xlsx(#[from] calamine::XlsxError),
    #[error("xls: {0}")]
    Xls(#[from] calamine::XlsError),
    #[error("workbook has no sheets")]
    NoSheet,
}

/// Turns uploaded bytes into rows and columns. Content that cannot be
/// decoded yields an empty table instead of an error; the validator then
/// reports the missing columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct TabularParser;

impl TabularParser {
    pub fn parse(&self, data: &[u8], format: FileFormat) -> Table {
        let start = std::time::Instant::now();

        let parsed = match format {
            FileFormat::Csv => parse_delimited(data),
            FileFormat::Xlsx => open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(data))
                .map_err(ParseError::from)
                .and_then(|mut workbook| first_sheet(&mut workbook)),
            FileFormat::Xls => open_workbook_from_rs::<Xls<_>, _>(Cursor::new(data))
                .map_err(ParseError::from)
                .and_then(|mut workbook| first_sheet(&mut workbook)),
        };

        match parsed {
            Ok(table) => {
                tracing::info!(
                    "Parsed {:?} file: {} rows, {} columns in {:?}",
                    format,
                    table.rows.len(),
                    table.columns.len(),
                    start.elapsed()
                );
                table
            }
            Err(e) => {
                tracing::warn!("Could not decode {:?} file ({} bytes): {}", format, data.len(), e);
                Table::empty()
            }
        }
    }
}

fn parse_delimited(data: &[u8]) -> Result<Table, ParseError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    // Fields are decoded lossily; a non-UTF-8 byte keeps its row.
    let mut existing_names = HashSet::new();
    let columns: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|name| unique_column_name(&decode_field(name), &mut existing_names))
        .collect();

    let mut rows = Vec::new();
    let mut lossy_rows = 0;
    for record in reader.byte_records() {
        let record = record?;
        if record.iter().all(<[u8]>::is_empty) {
            continue;
        }
        if std::str::from_utf8(record.as_slice()).is_err() {
            lossy_rows += 1;
        }

        let row: Row = columns
            .iter()
            .zip(record.iter())
            .map(|(name, field)| (name.clone(), CellValue::from_text(&decode_field(field))))
            .collect();
        rows.push(row);
    }

    if lossy_rows > 0 {
        tracing::warn!("{} CSV rows contained invalid UTF-8; replaced undecodable bytes", lossy_rows);
    }

    Ok(Table { rows, columns })
}

fn decode_field(field: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(field)
}

fn first_sheet<RS, W>(workbook: &mut W) -> Result<Table, ParseError>
where
    RS: Read + Seek,
    W: Reader<RS>,
    ParseError: From<W::Error>,
{
    let range = workbook.worksheet_range_at(0).ok_or(ParseError::NoSheet)??;
    Ok(table_from_range(&range))
}

/// First row is the header. Each later row keeps only its non-empty cells,
/// and fully blank rows are dropped. The column set is the key order of the
/// first decoded row.
pub(crate) fn table_from_range(range: &Range<Data>) -> Table {
    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Table::empty();
    };

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| unique_column_name(&header_name(cell), &mut existing_names))
        .collect();

    let rows: Vec<Row> = sheet_rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells.iter())
                .map(|(name, cell)| (name.clone(), cell_value(cell)))
                .filter(|(_, value)| !value.is_empty())
                .collect::<Row>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    let columns = rows
        .first()
        .map(|row| row.keys().map(str::to_string).collect())
        .unwrap_or_default();

    Table { rows, columns }
}
