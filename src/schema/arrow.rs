// src/schema/arrow.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, StringBuilder},
    datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::{OutputLayout, PERIOD_END_FIELD, PERIOD_FIELD};
use crate::period::Frequency;
use crate::rolling::AggregateRow;

/// Canonical published schema:
/// - dimension labels            → Utf8
/// - Quarter / Month             → Utf8
/// - measures, Year-End columns  → Float64
/// - Period End Timestamp        → Date32
pub fn build_output_schema(layout: &OutputLayout, freq: Frequency) -> Arc<ArrowSchema> {
    let mut fields: Vec<ArrowField> = layout
        .axes
        .iter()
        .map(|d| ArrowField::new(layout.dimension_label(*d), DataType::Utf8, false))
        .collect();
    fields.push(ArrowField::new(freq.label(), DataType::Utf8, false));
    for m in &layout.measures {
        fields.push(ArrowField::new(&m.name, DataType::Float64, true));
    }
    for m in &layout.measures {
        fields.push(ArrowField::new(&m.year_end, DataType::Float64, true));
    }
    fields.push(ArrowField::new(PERIOD_END_FIELD, DataType::Date32, false));

    Arc::new(ArrowSchema::new(fields))
}

/// Build a batch with source-side field names (`region`, `period`, raw
/// measure labels, `year_end:<measure>`). The finalizer takes it from here.
pub fn to_record_batch(rows: &[AggregateRow], layout: &OutputLayout) -> Result<RecordBatch> {
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    for dim in &layout.axes {
        let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 16);
        for r in rows {
            b.append_option(r.dims.get(*dim));
        }
        fields.push(ArrowField::new(dim.key(), DataType::Utf8, true));
        columns.push(Arc::new(b.finish()));
    }

    let mut periods = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
    for r in rows {
        periods.append_value(r.period.to_string());
    }
    fields.push(ArrowField::new(PERIOD_FIELD, DataType::Utf8, false));
    columns.push(Arc::new(periods.finish()));

    for (i, m) in layout.measures.iter().enumerate() {
        let mut b = Float64Builder::with_capacity(rows.len());
        for r in rows {
            b.append_option(r.values.get(i).copied().flatten());
        }
        fields.push(ArrowField::new(&m.source, DataType::Float64, true));
        columns.push(Arc::new(b.finish()));
    }

    for (i, m) in layout.measures.iter().enumerate() {
        let mut b = Float64Builder::with_capacity(rows.len());
        for r in rows {
            b.append_option(r.year_end.get(i).copied().flatten());
        }
        fields.push(ArrowField::new(m.raw_year_end(), DataType::Float64, true));
        columns.push(Arc::new(b.finish()));
    }

    RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), columns)
        .context("building aggregate record batch")
}
