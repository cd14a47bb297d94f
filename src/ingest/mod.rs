// src/ingest/mod.rs
pub mod sdmx;
pub mod xlsx;

use chrono::NaiveDate;

/// A long table as returned by the data API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    /// Column names from the header row, cleaned.
    pub headers: Vec<String>,
    /// Each data row, as a Vec of Strings (one per field).
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// One spreadsheet cell, already typed by the workbook reader.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

/// A worksheet: the first row as headers, everything below as cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// What a fetch hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Table(RawTable),
    Sheet(RawSheet),
}

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}
