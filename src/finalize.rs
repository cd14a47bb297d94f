// src/finalize.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, StringArray},
    compute::{cast_with_options, CastOptions},
    datatypes::DataType,
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

use crate::error::PipelineError;
use crate::period::{Frequency, Period};
use crate::schema::{build_output_schema, OutputLayout, PERIOD_FIELD};

/// Find a column under any of its names (source-side first, then published).
fn column<'a>(batch: &'a RecordBatch, names: &[&str]) -> Result<&'a ArrayRef> {
    names
        .iter()
        .find_map(|n| batch.column_by_name(n))
        .ok_or_else(|| {
            PipelineError::MissingColumn {
                source_name: "aggregate batch".into(),
                column: names.join(" | "),
            }
            .into()
        })
}

fn strict_cast(array: &ArrayRef, to: &DataType, name: &str) -> Result<ArrayRef> {
    let opts = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array, to, &opts).with_context(|| format!("casting {} to {}", name, to))
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    date.signed_duration_since(epoch).num_days() as i32
}

fn period_end(periods: &ArrayRef) -> Result<ArrayRef> {
    let periods = periods
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("period column is not Utf8"))?;
    let mut days = Vec::with_capacity(periods.len());
    for p in periods.iter() {
        let p = p.ok_or_else(|| anyhow!("null period"))?;
        days.push(days_since_epoch(Period::parse(p)?.end_date()));
    }
    Ok(Arc::new(Date32Array::from(days)))
}

/// Rename, reorder and cast a batch to the published schema, deriving
/// `Period End Timestamp` from the period.
///
/// Accepts either source-side or already published field names, so
/// finalizing twice is the same as finalizing once. Casts are strict: text
/// that doesn't parse as a number is an error, not a null.
pub fn finalize(batch: &RecordBatch, layout: &OutputLayout, freq: Frequency) -> Result<RecordBatch> {
    let schema = build_output_schema(layout, freq);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for dim in &layout.axes {
        let label = layout.dimension_label(*dim);
        let col = column(batch, &[dim.key(), label])?;
        columns.push(strict_cast(col, &DataType::Utf8, label)?);
    }

    let period = strict_cast(
        column(batch, &[PERIOD_FIELD, freq.label()])?,
        &DataType::Utf8,
        freq.label(),
    )?;
    columns.push(period.clone());

    for m in &layout.measures {
        let col = column(batch, &[m.source.as_str(), m.name.as_str()])?;
        columns.push(strict_cast(col, &DataType::Float64, &m.name)?);
    }
    for m in &layout.measures {
        let raw = m.raw_year_end();
        let col = column(batch, &[raw.as_str(), m.year_end.as_str()])?;
        columns.push(strict_cast(col, &DataType::Float64, &m.year_end)?);
    }

    columns.push(period_end(&period)?);

    // nulls are allowed only where the published schema says so
    let batch = RecordBatch::try_new(schema, columns).context("assembling finalized batch")?;
    debug!(rows = batch.num_rows(), columns = batch.num_columns(), "finalized");
    Ok(batch)
}
