pub mod parser;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod fixtures;

pub use parser::TabularParser;
pub use types::{CellValue, FileFormat, Row, Table};
