// src/decode.rs
//! Turns ingested records into `FactRow`s with named dimensions.
//!
//! Workbook columns carry `;`-joined compound labels whose segments are
//! already readable labels. API rows carry short codes that are looked up
//! in the codelist each column is mapped to.

use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::error::PipelineError;
use crate::ingest::RawTable;
use crate::period::Period;
use crate::reshape::{FactRow, Melted};
use crate::schema::catalog::Replacement;
use crate::schema::{ApiVersion, Axis, DatasetSpec, Dimension, DimensionValues, SheetSource, Vocabulary};

pub const TIME_COLUMN: &str = "TIME_PERIOD";
pub const VALUE_COLUMN: &str = "OBS_VALUE";

/// Facts plus everything rejected on the way.
#[derive(Debug, Default)]
pub struct Decoded {
    pub facts: Vec<FactRow>,
    pub errors: Vec<PipelineError>,
}

/// Split a compound label into exactly `segments` parts.
///
/// At most `segments - 1` splits are made, so a `;` inside the last segment
/// survives. Each part is trimmed of whitespace and stray `;`.
pub fn split_label(label: &str, segments: usize) -> Result<Vec<String>, PipelineError> {
    let parts: Vec<String> = label
        .splitn(segments.max(1), ';')
        .map(|s| s.trim_matches(|c: char| c == ';' || c.is_whitespace()).to_string())
        .collect();
    if parts.len() < segments || parts.iter().any(String::is_empty) {
        return Err(PipelineError::MalformedMetadata {
            label: label.to_string(),
            expected: segments,
            found: parts.iter().filter(|p| !p.is_empty()).count(),
        });
    }
    Ok(parts)
}

fn fill_axes(dims: &mut DimensionValues, constants: &[(Dimension, String)], replacements: &[Replacement]) {
    for (dim, value) in constants {
        if dims.get(*dim).is_none() {
            dims.set(*dim, value.clone());
        }
    }
    for r in replacements {
        if dims.get(r.dim) == Some(r.from.as_str()) {
            dims.set(r.dim, r.to.clone());
        }
    }
}

/// What one compound label resolves to: the measure segment and the dimensions.
type ParsedLabel = Result<(Option<String>, DimensionValues), PipelineError>;

fn parse_label(label: &str, sheet: &SheetSource) -> ParsedLabel {
    let parts = split_label(label, sheet.segments.len())?;
    let mut measure = None;
    let mut dims = DimensionValues::new();
    for (axis, part) in sheet.segments.iter().zip(parts) {
        match axis {
            Axis::Measure => measure = Some(part),
            Axis::Dim(d) => dims.set(*d, part),
        }
    }
    Ok((measure, dims))
}

/// Decode melted workbook cells.
///
/// Every surviving fact is relabelled to the dataset's tracked measure:
/// the workbook's own measure segment only serves the optional filter.
#[instrument(level = "debug", skip_all, fields(dataset = %spec.name, cells = melted.len()))]
pub fn decode_sheet(melted: Vec<Melted<Period>>, sheet: &SheetSource, spec: &DatasetSpec) -> Decoded {
    let mut out = Decoded::default();
    let Some(tracked) = spec.layout.measures.first() else {
        return out;
    };
    let mut labels: HashMap<String, ParsedLabel> = HashMap::new();
    let mut filtered = 0usize;

    for cell in melted {
        let parsed = labels
            .entry(cell.column.clone())
            .or_insert_with(|| parse_label(&cell.column, sheet));
        let (measure, dims) = match &*parsed {
            Ok(p) => p,
            Err(e) => {
                out.errors.push(e.clone());
                continue;
            }
        };
        if let (Some(wanted), Some(found)) = (&sheet.measure_filter, measure.as_ref()) {
            if wanted != found {
                filtered += 1;
                continue;
            }
        }

        let mut dims = dims.clone();
        fill_axes(&mut dims, &spec.constants, &spec.replacements);
        out.facts.push(FactRow {
            dims,
            period: cell.id,
            measure: tracked.source.clone(),
            value: cell.value,
        });
    }

    if filtered > 0 {
        debug!(filtered, "cells outside the measure filter");
    }
    if !out.errors.is_empty() {
        warn!(rejected = out.errors.len(), "malformed compound labels");
    }
    out
}

/// Decode an SDMX-CSV payload against one explicit API version.
///
/// A mapped column missing from the payload fails the whole query. Rows
/// with an unknown code, an unreadable period or an unreadable value are
/// excluded and reported; an empty `OBS_VALUE` is an absent observation.
#[instrument(level = "debug", skip_all, fields(dataset = %spec.name, version = %version.name))]
pub fn decode_api(
    table: &RawTable,
    version: &ApiVersion,
    vocab: &Vocabulary,
    spec: &DatasetSpec,
) -> Result<Decoded, PipelineError> {
    let index = |column: &str| {
        table.column_index(column).ok_or_else(|| PipelineError::MissingColumn {
            source_name: format!("{}/{}", spec.name, version.name),
            column: column.to_string(),
        })
    };
    let mapped: Vec<(usize, &crate::schema::ColumnMap)> = version
        .columns
        .iter()
        .map(|c| index(&c.column).map(|i| (i, c)))
        .collect::<Result<_, _>>()?;
    let time_idx = index(TIME_COLUMN)?;
    let value_idx = index(VALUE_COLUMN)?;

    let mut out = Decoded::default();
    'rows: for row in &table.rows {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
        let mut dims = DimensionValues::new();
        let mut measure = None;
        for (idx, map) in &mapped {
            let code = cell(*idx);
            let Some(label) = vocab.decode(&map.codelist, code) else {
                out.errors.push(PipelineError::UnknownCode {
                    column: map.column.clone(),
                    codelist: map.codelist.clone(),
                    code: code.to_string(),
                });
                continue 'rows;
            };
            match map.axis {
                Axis::Measure => measure = Some(label),
                Axis::Dim(d) => dims.set(d, label),
            }
        }
        let Some(measure) = measure else {
            continue;
        };

        let period = match Period::parse(cell(time_idx)) {
            Ok(p) if p.frequency() == spec.frequency => p,
            Ok(_) | Err(_) => {
                out.errors.push(PipelineError::InvalidPeriod(cell(time_idx).to_string()));
                continue;
            }
        };

        let raw = cell(value_idx).trim();
        let value = if raw.is_empty() {
            None
        } else {
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    out.errors.push(PipelineError::InvalidValue {
                        column: VALUE_COLUMN.to_string(),
                        value: raw.to_string(),
                    });
                    continue;
                }
            }
        };

        fill_axes(&mut dims, &spec.constants, &spec.replacements);
        out.facts.push(FactRow {
            dims,
            period,
            measure,
            value,
        });
    }

    debug!(facts = out.facts.len(), rejected = out.errors.len(), "decoded API payload");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::catalog::builtin;
    use crate::schema::Source;

    fn dataset(name: &str) -> DatasetSpec {
        builtin()
            .into_iter()
            .find(|d| d.name == name)
            .expect("dataset is built in")
    }

    #[test]
    fn split_keeps_delimiters_in_last_segment() {
        let parts = split_label("Number ;  Houses ;  Region; with; semicolons ;", 3).unwrap();
        assert_eq!(parts, vec!["Number", "Houses", "Region; with; semicolons"]);
    }

    #[test]
    fn split_rejects_short_and_empty_labels() {
        let err = split_label("Number ; Houses", 3).unwrap_err();
        assert_eq!(
            err,
            PipelineError::MalformedMetadata {
                label: "Number ; Houses".into(),
                expected: 3,
                found: 2
            }
        );
        assert!(split_label("Number ; ; NSW", 3).is_err());
    }

    #[test]
    fn sheet_cells_pick_up_constants_and_replacements() {
        let spec = dataset("approvals_demolition");
        let Source::Sheet(sheet) = spec.source.clone() else {
            panic!("demolition is a workbook source");
        };
        let period = Period::parse("2020Q1").unwrap();
        let melted = vec![
            Melted {
                id: period,
                column: "Dwelling units ;  Total (Type of Building) ;  New South Wales ;".into(),
                value: Some(3.0),
            },
            Melted {
                id: period,
                column: "broken label".into(),
                value: Some(1.0),
            },
        ];
        let out = decode_sheet(melted, &sheet, &spec);
        assert_eq!(out.facts.len(), 1);
        assert_eq!(out.errors[0].kind(), ErrorKind::MalformedMetadata);

        let dims = &out.facts[0].dims;
        assert_eq!(dims.get(Dimension::BuildingType), Some("Total"));
        assert_eq!(dims.get(Dimension::Region), Some("New South Wales"));
        assert_eq!(dims.get(Dimension::Sector), Some("Total Sector"));
        assert_eq!(out.facts[0].measure, "Dwelling Units Approved for Demolition");
    }

    #[test]
    fn measure_filter_drops_other_series() {
        let spec = dataset("work_not_yet_commenced");
        let Source::Sheet(sheet) = spec.source.clone() else {
            panic!("work not yet commenced is a workbook source");
        };
        let period = Period::parse("2020Q1").unwrap();
        let melted = vec![
            Melted {
                id: period,
                column: "Value of work not yet commenced ; Houses ; Victoria ;".into(),
                value: Some(5.0),
            },
            Melted {
                id: period,
                column: "Value of work in the pipeline ; Houses ; Victoria ;".into(),
                value: Some(9.0),
            },
        ];
        let out = decode_sheet(melted, &sheet, &spec);
        assert_eq!(out.facts.len(), 1);
        assert_eq!(out.facts[0].value, Some(5.0));
    }

    fn activity_table(rows: &[[&str; 10]]) -> RawTable {
        RawTable {
            headers: [
                "MEASURE",
                "REGION",
                "PRICE_ADJ",
                "BLD_WORK_TYPE",
                "SECTOR_OWN",
                "TYPE_BLDG",
                "TSEST",
                "FREQ",
                TIME_COLUMN,
                VALUE_COLUMN,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn unknown_codes_are_rejected_not_guessed() -> Result<(), PipelineError> {
        let spec = dataset("building_activity");
        let Source::Api(api) = spec.source.clone() else {
            panic!("building activity is an API source");
        };
        let table = activity_table(&[
            ["1", "1", "CUR", "TOT", "TOT", "110", "10", "Q", "2020-Q1", "10"],
            ["1", "1", "CUR", "TOT", "TOT", "999", "10", "Q", "2020-Q1", "11"],
            ["1", "2", "CUR", "TOT", "TOT", "110", "10", "Q", "2020-Q1", ""],
        ]);
        let out = decode_api(&table, &api.versions[0], &Vocabulary::builtin(), &spec)?;

        assert_eq!(out.facts.len(), 2);
        assert_eq!(
            out.errors,
            vec![PipelineError::UnknownCode {
                column: "TYPE_BLDG".into(),
                codelist: "CL_TYPE_BLDG".into(),
                code: "999".into()
            }]
        );
        let first = &out.facts[0];
        assert_eq!(first.measure, "Number of dwelling units commenced");
        assert_eq!(first.dims.get(Dimension::BuildingType), Some("Houses"));
        assert_eq!(first.dims.get(Dimension::RegionType), Some("States and Territories"));
        assert_eq!(out.facts[1].value, None);
        Ok(())
    }

    #[test]
    fn missing_mapped_column_fails_the_query() {
        let spec = dataset("building_activity");
        let Source::Api(api) = spec.source.clone() else {
            panic!("building activity is an API source");
        };
        let mut table = activity_table(&[]);
        table.headers[5] = "BUILDING".into();
        let err = decode_api(&table, &api.versions[0], &Vocabulary::builtin(), &spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingColumn);
    }

    #[test]
    fn wrong_frequency_periods_are_rejected() -> Result<(), PipelineError> {
        let spec = dataset("building_activity");
        let Source::Api(api) = spec.source.clone() else {
            panic!("building activity is an API source");
        };
        let table = activity_table(&[["1", "1", "CUR", "TOT", "TOT", "110", "10", "M", "2020-01", "3"]]);
        let out = decode_api(&table, &api.versions[0], &Vocabulary::builtin(), &spec)?;
        assert!(out.facts.is_empty());
        assert_eq!(out.errors[0].kind(), ErrorKind::InvalidPeriod);
        Ok(())
    }
}
