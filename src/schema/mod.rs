pub mod arrow;
pub mod catalog;
pub mod vocab;

pub use arrow::{build_output_schema, to_record_batch};
pub use catalog::{ApiSource, ApiVersion, ColumnMap, DatasetSpec, SheetSource, Source};
pub use vocab::{CodeTable, Vocabulary};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed set of categorical axes a fact can vary over (time and
/// measure excluded). Declaration order is the canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Region,
    RegionType,
    BuildingWorkType,
    Sector,
    BuildingType,
    PriceAdjustment,
    AdjustmentType,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Region,
        Dimension::RegionType,
        Dimension::BuildingWorkType,
        Dimension::Sector,
        Dimension::BuildingType,
        Dimension::PriceAdjustment,
        Dimension::AdjustmentType,
    ];

    /// Field name used before finalization.
    pub fn key(self) -> &'static str {
        match self {
            Dimension::Region => "region",
            Dimension::RegionType => "region_type",
            Dimension::BuildingWorkType => "building_work_type",
            Dimension::Sector => "sector",
            Dimension::BuildingType => "building_type",
            Dimension::PriceAdjustment => "price_adjustment",
            Dimension::AdjustmentType => "adjustment_type",
        }
    }

    /// Published column header. Region is dataset-specific ("State" or "Region").
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Region => "Region",
            Dimension::RegionType => "Region Type",
            Dimension::BuildingWorkType => "Building Work Type",
            Dimension::Sector => "Sector",
            Dimension::BuildingType => "Building Type",
            Dimension::PriceAdjustment => "Price Adjustment",
            Dimension::AdjustmentType => "Adjustment Type",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a decoded field feeds: one of the dimensions, or the measure axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Measure,
    Dim(Dimension),
}

/// Labels of every non-time dimension of one fact. Two facts belong to the
/// same rolling group exactly when their `DimensionValues` are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DimensionValues(BTreeMap<Dimension, String>);

impl DimensionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, dim: Dimension, label: impl Into<String>) {
        self.0.insert(dim, label.into());
    }

    pub fn with(mut self, dim: Dimension, label: impl Into<String>) -> Self {
        self.set(dim, label);
        self
    }

    pub fn get(&self, dim: Dimension) -> Option<&str> {
        self.0.get(&dim).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &str)> {
        self.0.iter().map(|(d, v)| (*d, v.as_str()))
    }
}

impl fmt::Display for DimensionValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(d, v)| format!("{}={}", d, v)).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// A tracked measure: its label in the source, its published name, and the
/// published name of its trailing-year aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub source: String,
    pub name: String,
    pub year_end: String,
}

impl MeasureSpec {
    pub fn new(source: &str, name: &str, year_end: &str) -> Self {
        Self {
            source: source.to_string(),
            name: name.to_string(),
            year_end: year_end.to_string(),
        }
    }

    /// Field name of the aggregate before finalization.
    pub fn raw_year_end(&self) -> String {
        format!("year_end:{}", self.source)
    }
}

/// Column layout of one published table.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    /// Header of the region axis ("State" or "Region").
    pub region_label: String,
    /// Dimension columns emitted, in canonical order.
    pub axes: Vec<Dimension>,
    pub measures: Vec<MeasureSpec>,
}

impl OutputLayout {
    pub fn dimension_label(&self, dim: Dimension) -> &str {
        match dim {
            Dimension::Region => &self.region_label,
            other => other.label(),
        }
    }
}

pub const PERIOD_FIELD: &str = "period";
pub const PERIOD_END_FIELD: &str = "Period End Timestamp";
