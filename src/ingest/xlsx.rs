// src/ingest/xlsx.rs

use anyhow::{anyhow, Context, Result};
use calamine::{Data, Reader, Xlsx};
use chrono::{Days, NaiveDate};
use std::io::Cursor;
use tracing::{debug, warn};

use super::{Cell, RawSheet};
use crate::error::PipelineError;
use crate::period::{Frequency, Period};
use crate::reshape::WideTable;

/// Read one worksheet out of an in-memory `.xlsx`.
pub fn read_sheet(bytes: &[u8], sheet: &str) -> Result<RawSheet> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).context("opening xlsx workbook")?;
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("reading sheet {}", sheet))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| anyhow!("sheet {} is empty", sheet))?
        .iter()
        .map(|d| header_text(&cell_from(d)))
        .collect();
    let rows: Vec<Vec<Cell>> = rows.map(|r| r.iter().map(cell_from).collect()).collect();

    debug!(sheet, columns = headers.len(), rows = rows.len(), "read worksheet");
    Ok(RawSheet { headers, rows })
}

fn cell_from(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Cell::Date(ts.date()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

fn header_text(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Number(n) => n.to_string(),
        Cell::Text(s) => s.trim().to_string(),
        Cell::Date(d) => d.to_string(),
    }
}

static EMPTY: Cell = Cell::Empty;

/// Excel serial day 0.
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

fn period_of(cell: &Cell, freq: Frequency) -> Option<Period> {
    let date = match cell {
        Cell::Date(d) => *d,
        Cell::Number(serial) if serial.is_finite() && *serial >= 1.0 => {
            excel_epoch().checked_add_days(Days::new(serial.floor() as u64))?
        }
        Cell::Text(s) => {
            let s = s.trim();
            if let Ok(p) = Period::parse(s) {
                return (p.frequency() == freq).then_some(p);
            }
            ["%Y-%m-%d", "%d/%m/%Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .or_else(|| NaiveDate::parse_from_str(&format!("01-{}", s), "%d-%b-%Y").ok())?
        }
        _ => return None,
    };
    Some(Period::containing(date, freq))
}

fn value_of(cell: &Cell, column: &str) -> Result<Option<f64>, PipelineError> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(n) if n.is_finite() => Ok(Some(*n)),
        Cell::Text(s) if s.trim().is_empty() => Ok(None),
        Cell::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(PipelineError::InvalidValue {
                column: column.to_string(),
                value: s.clone(),
            }),
        },
        other => Err(PipelineError::InvalidValue {
            column: column.to_string(),
            value: format!("{:?}", other),
        }),
    }
}

/// Turn a data sheet into a period-indexed wide table.
///
/// The first column holds the period date; `skip_rows` non-data rows
/// follow the header. Rows whose date can't be read are rejected with
/// `InvalidPeriod`, unreadable cells become absent and are reported as
/// `InvalidValue`. Fully blank rows are skipped silently.
pub fn to_wide(
    sheet: &RawSheet,
    skip_rows: usize,
    freq: Frequency,
) -> (WideTable<Period>, Vec<PipelineError>) {
    let columns: Vec<String> = sheet.headers.iter().skip(1).cloned().collect();
    let mut table = WideTable::new(columns);
    let mut errors = Vec::new();

    for row in sheet.rows.iter().skip(skip_rows) {
        if row.iter().all(|c| matches!(c, Cell::Empty)) {
            continue;
        }
        let first = row.first().unwrap_or(&EMPTY);
        let Some(period) = period_of(first, freq) else {
            errors.push(PipelineError::InvalidPeriod(header_text(first)));
            continue;
        };

        let mut cells = Vec::with_capacity(table.columns.len());
        for (j, column) in table.columns.iter().enumerate() {
            let cell = row.get(j + 1).unwrap_or(&EMPTY);
            match value_of(cell, column) {
                Ok(v) => cells.push(v),
                Err(e) => {
                    cells.push(None);
                    errors.push(e);
                }
            }
        }
        table.push_row(period, cells);
    }

    if !errors.is_empty() {
        warn!(rejected = errors.len(), "unreadable cells in worksheet");
    }
    (table, errors)
}
