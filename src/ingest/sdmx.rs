// src/ingest/sdmx.rs

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::io::Cursor;
use tracing::debug;

use super::{clean_str, RawTable};

/// Parse an SDMX-CSV response body (`DATAFLOW,MEASURE,…,TIME_PERIOD,OBS_VALUE,…`).
pub fn parse_csv(body: &[u8]) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // trailing attribute columns are sometimes omitted
        .from_reader(Cursor::new(body));

    let headers: Vec<String> = rdr
        .headers()
        .context("reading SDMX-CSV header")?
        .iter()
        .map(clean_str)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("SDMX-CSV parse error at record {}", idx))?;
        let mut row: Vec<String> = record.iter().map(clean_str).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }
    debug!(columns = headers.len(), rows = rows.len(), "parsed SDMX-CSV");

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_pads_short_rows() -> Result<()> {
        let body = b"DATAFLOW,MEASURE,REGION,TIME_PERIOD,OBS_VALUE,OBS_STATUS\n\
ABS:BUILDING_ACTIVITY(1.0.0),1,1,2020-Q1,10,\n\
ABS:BUILDING_ACTIVITY(1.0.0),1,2,2020-Q1,12\n";
        let table = parse_csv(body)?;
        assert_eq!(table.column_index("TIME_PERIOD"), Some(3));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].len(), 6);
        assert_eq!(table.rows[1][4], "12");
        Ok(())
    }
}
