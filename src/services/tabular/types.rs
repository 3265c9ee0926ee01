use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

const CSV_MEDIA_TYPES: [&str; 3] = ["text/csv", "application/csv", "text/x-csv"];
const XLSX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MEDIA_TYPE: &str = "application/vnd.ms-excel";

/// Upload formats the parser knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Picks the format from the declared media type, falling back to the
    /// file extension when the media type is missing or generic
    /// (browsers often send `application/octet-stream`).
    ///
    /// Windows hosts with Office installed label `.csv` files as
    /// `application/vnd.ms-excel`, so a `.csv` name overrides that one type.
    pub fn detect(media_type: Option<&str>, file_name: &str) -> Option<Self> {
        let declared = media_type.and_then(Self::from_media_type);
        let by_name = Self::from_extension(file_name);

        match (declared, by_name) {
            (Some(FileFormat::Xls), Some(FileFormat::Csv)) => Some(FileFormat::Csv),
            (Some(format), _) => Some(format),
            (None, by_name) => by_name,
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            t if CSV_MEDIA_TYPES.contains(&t) => Some(FileFormat::Csv),
            XLSX_MEDIA_TYPE => Some(FileFormat::Xlsx),
            XLS_MEDIA_TYPE => Some(FileFormat::Xls),
            _ => None,
        }
    }

    pub fn from_extension(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Xls => "xls",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// Empty strings are stored as `Empty` so both backends agree on what "absent" means.
    pub fn from_text(raw: &str) -> Self {
        if raw.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(raw.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used when cell values are compared as strings.
    pub fn render(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Empty => serializer.serialize_none(),
        }
    }
}

/// One data record keyed by column name, in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    /// Exact-name lookup; callers resolve normalized names against the column set first.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Parsed rows plus the ordered column set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_media_type_before_extension() {
        assert_eq!(
            FileFormat::detect(Some("text/csv; charset=utf-8"), "export.xlsx"),
            Some(FileFormat::Csv)
        );
        assert_eq!(
            FileFormat::detect(Some(XLSX_MEDIA_TYPE), "report"),
            Some(FileFormat::Xlsx)
        );
    }

    #[test]
    fn csv_labelled_as_excel_is_read_as_csv() {
        assert_eq!(
            FileFormat::detect(Some(XLS_MEDIA_TYPE), "spend.csv"),
            Some(FileFormat::Csv)
        );
        assert_eq!(
            FileFormat::detect(Some(XLS_MEDIA_TYPE), "spend.xls"),
            Some(FileFormat::Xls)
        );
        assert_eq!(FileFormat::detect(Some(XLS_MEDIA_TYPE), "spend"), Some(FileFormat::Xls));
    }

    #[test]
    fn falls_back_to_extension_for_generic_media_types() {
        assert_eq!(
            FileFormat::detect(Some("application/octet-stream"), "Spend.XLS"),
            Some(FileFormat::Xls)
        );
        assert_eq!(FileFormat::detect(None, "data.csv"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::detect(None, "notes.txt"), None);
        assert_eq!(FileFormat::detect(None, "no_extension"), None);
    }

    #[test]
    fn row_serializes_as_ordered_object() {
        let row: Row = vec![
            ("Spend", CellValue::Number(12.5)),
            ("Date", CellValue::from_text("2024-01-01")),
            ("Channel", CellValue::Empty),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"Spend":12.5,"Date":"2024-01-01","Channel":null}"#);
    }

    #[test]
    fn renders_whole_numbers_without_fraction() {
        assert_eq!(CellValue::Number(42.0).render(), "42");
        assert_eq!(CellValue::Number(0.25).render(), "0.25");
        assert_eq!(CellValue::from_text("").render(), "");
        assert!(CellValue::from_text("").is_empty());
    }
}
