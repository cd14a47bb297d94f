// src/schema/catalog.rs
//! Explicit, versioned source schemas for every published table.
//!
//! Each API version lists the columns it is expected to carry, the axis
//! each column feeds and the codelist that decodes it. Nothing about the
//! shape of a payload is inferred at runtime.

use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate};
use url::Url;

use super::{Axis, Dimension, MeasureSpec, OutputLayout};
use crate::period::Frequency;

#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub column: String,
    pub axis: Axis,
    pub codelist: String,
}

impl ColumnMap {
    fn new(column: &str, axis: Axis, codelist: &str) -> Self {
        Self {
            column: column.to_string(),
            axis,
            codelist: codelist.to_string(),
        }
    }
}

/// One version of an SDMX dataflow.
#[derive(Debug, Clone)]
pub struct ApiVersion {
    pub name: String,
    pub flow: String,
    pub version: String,
    /// One query per key; several keys fan out.
    pub keys: Vec<String>,
    /// A failed required query fails the dataset; optional ones only warn.
    pub required: bool,
    pub columns: Vec<ColumnMap>,
}

impl ApiVersion {
    pub fn url(&self, api_base: &str, key: &str) -> Result<Url> {
        let base = Url::parse(api_base).with_context(|| format!("parsing API base {}", api_base))?;
        let mut url = base
            .join(&format!("ABS,{},{}/{}", self.flow, self.version, key))
            .with_context(|| format!("joining key {} onto {}", key, api_base))?;
        url.set_query(Some("dimensionAtObservation=AllDimensions"));
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct ApiSource {
    pub versions: Vec<ApiVersion>,
}

/// Which ABS release a workbook belongs to; decides the release label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseSeries {
    /// Monthly building approvals, published about two months after the reference month.
    BuildingApprovals,
    /// Quarterly building activity, published about two quarters after the reference quarter.
    BuildingActivity,
}

impl ReleaseSeries {
    pub fn path(self) -> &'static str {
        match self {
            ReleaseSeries::BuildingApprovals => "building-approvals-australia",
            ReleaseSeries::BuildingActivity => "building-activity-australia",
        }
    }

    /// Release label such as `aug-2024`, relative to `today`.
    pub fn label(self, today: NaiveDate) -> String {
        match self {
            ReleaseSeries::BuildingApprovals => {
                let d = today.checked_sub_months(Months::new(2)).unwrap_or(today);
                d.format("%b-%Y").to_string().to_lowercase()
            }
            ReleaseSeries::BuildingActivity => {
                let d = today.checked_sub_months(Months::new(6)).unwrap_or(today);
                let quarter_end_month = ((d.month() - 1) / 3 + 1) * 3;
                let d = NaiveDate::from_ymd_opt(d.year(), quarter_end_month, 1).unwrap_or(d);
                d.format("%b-%Y").to_string().to_lowercase()
            }
        }
    }
}

/// A downloadable `.xlsx` release whose data sheet is wide by compound label.
#[derive(Debug, Clone)]
pub struct SheetSource {
    pub catalogue: String,
    pub release: ReleaseSeries,
    pub sheet: String,
    /// Non-data rows between the header and the first observation.
    pub skip_rows: usize,
    /// Positional meaning of the `;`-joined label segments.
    pub segments: Vec<Axis>,
    /// Only labels whose measure segment equals this are kept.
    pub measure_filter: Option<String>,
}

impl SheetSource {
    pub fn url(&self, release_base: &str, today: NaiveDate) -> Result<Url> {
        let base =
            Url::parse(release_base).with_context(|| format!("parsing release base {}", release_base))?;
        base.join(&format!(
            "{}/{}/{}.xlsx",
            self.release.path(),
            self.release.label(today),
            self.catalogue
        ))
        .context("joining workbook path")
    }
}

#[derive(Debug, Clone)]
pub enum Source {
    Api(ApiSource),
    Sheet(SheetSource),
}

/// Label rewrite applied after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub dim: Dimension,
    pub from: String,
    pub to: String,
}

/// Everything needed to turn one source into one published table.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub name: String,
    pub output_file: String,
    pub frequency: Frequency,
    pub source: Source,
    /// Axes the source does not carry, filled with a literal.
    pub constants: Vec<(Dimension, String)>,
    pub replacements: Vec<Replacement>,
    /// Rows are published only when every listed dimension has this label.
    pub keep: Vec<(Dimension, String)>,
    pub layout: OutputLayout,
}

impl DatasetSpec {
    pub fn measure_sources(&self) -> Vec<String> {
        self.layout.measures.iter().map(|m| m.source.clone()).collect()
    }
}

fn constants(pairs: &[(Dimension, &str)]) -> Vec<(Dimension, String)> {
    pairs.iter().map(|(d, v)| (*d, v.to_string())).collect()
}

fn replace(dim: Dimension, from: &str, to: &str) -> Replacement {
    Replacement {
        dim,
        from: from.to_string(),
        to: to.to_string(),
    }
}

const STATES_AND_TERRITORIES: &str = "States and Territories";
const TOTAL_BUILDING_TYPE: &str = "Total (Type of Building)";

const APPROVALS_BUILDING_TYPES: &[&str] = &[
    "TOT", "100", "150", "130", "134", "133", "132", "131", "120", "122", "121", "110", "700",
];

fn approvals_columns(sector_codelist: &str, region_codelist: &str) -> Vec<ColumnMap> {
    vec![
        ColumnMap::new("MEASURE", Axis::Measure, "CL_BA_MEASURE"),
        ColumnMap::new("SECTOR", Axis::Dim(Dimension::Sector), sector_codelist),
        ColumnMap::new(
            "WORK_TYPE",
            Axis::Dim(Dimension::BuildingWorkType),
            "CL_BLD_WORK_TYPE",
        ),
        ColumnMap::new("BUILDING_TYPE", Axis::Dim(Dimension::BuildingType), "CL_TYPE_BLDG"),
        ColumnMap::new("REGION_TYPE", Axis::Dim(Dimension::RegionType), "CL_REGION_TYPE"),
        ColumnMap::new("REGION", Axis::Dim(Dimension::Region), region_codelist),
    ]
}

/// The 2016-21 history and the current flow, aligned onto one vocabulary.
fn approvals_versions(keys: &[String], region_codelist: &str, current_required: bool) -> Vec<ApiVersion> {
    vec![
        ApiVersion {
            name: "2016_2021".into(),
            flow: "BA_SA2_2016-21".into(),
            version: "1.0.0".into(),
            keys: keys.to_vec(),
            required: false,
            columns: approvals_columns("CL_SECTOR_2016", region_codelist),
        },
        ApiVersion {
            name: "2021_onwards".into(),
            flow: "BA_SA2".into(),
            version: "2.0.0".into(),
            keys: keys.to_vec(),
            required: current_required,
            columns: approvals_columns("CL_SECTOR", region_codelist),
        },
    ]
}

fn approvals_measures() -> Vec<MeasureSpec> {
    vec![
        MeasureSpec::new(
            "Number of dwelling units",
            "Dwelling Units",
            "Year-End Dwelling Units",
        ),
        MeasureSpec::new(
            "Value of building jobs",
            "Building Jobs Value",
            "Year-End Building Jobs Value",
        ),
    ]
}

fn building_activity() -> DatasetSpec {
    let measures = [
        ("Number of dwelling units commenced", "Dwelling Units Commenced", "Year-End Dwelling Units Commenced"),
        ("Number of dwelling units completed", "Dwelling Units Completed", "Year-End Dwelling Units Completed"),
        (
            "Number of dwelling units under construction",
            "Dwelling Units Under Construction",
            "Year-End Dwelling Units Under Construction",
        ),
        ("Value of work done during quarter", "Work Done", "Year-End Work Done During Quarter"),
        ("Value of work yet to be done", "Work Yet to be Done", "Year-End Work Yet To Be Done"),
        ("Value of work commenced", "Work Commenced", "Year-End Work Commenced"),
        ("Value of work completed", "Work Completed", "Year-End Work Completed"),
        ("Value of work under construction", "Work Under Construction", "Year-End Work Under Construction"),
    ];

    DatasetSpec {
        name: "building_activity".into(),
        output_file: "build_act.csv".into(),
        frequency: Frequency::Quarterly,
        source: Source::Api(ApiSource {
            versions: vec![ApiVersion {
                name: "current".into(),
                flow: "BUILDING_ACTIVITY".into(),
                version: "1.0.0".into(),
                // current prices and original series only, to keep the response small
                keys: vec!["..CUR....10.Q".into()],
                required: true,
                columns: vec![
                    ColumnMap::new("MEASURE", Axis::Measure, "CL_ACT_MEASURE"),
                    ColumnMap::new("REGION", Axis::Dim(Dimension::Region), "CL_STATE"),
                    ColumnMap::new("PRICE_ADJ", Axis::Dim(Dimension::PriceAdjustment), "CL_PRICE_ADJ"),
                    ColumnMap::new(
                        "BLD_WORK_TYPE",
                        Axis::Dim(Dimension::BuildingWorkType),
                        "CL_BLD_WORK_TYPE",
                    ),
                    ColumnMap::new("SECTOR_OWN", Axis::Dim(Dimension::Sector), "CL_SECTOR"),
                    ColumnMap::new("TYPE_BLDG", Axis::Dim(Dimension::BuildingType), "CL_TYPE_BLDG"),
                    ColumnMap::new("TSEST", Axis::Dim(Dimension::AdjustmentType), "CL_TSEST"),
                ],
            }],
        }),
        constants: constants(&[(Dimension::RegionType, STATES_AND_TERRITORIES)]),
        replacements: vec![],
        keep: constants(&[
            (Dimension::PriceAdjustment, "Current Prices"),
            (Dimension::AdjustmentType, "Original"),
        ]),
        layout: OutputLayout {
            region_label: "State".into(),
            axes: Dimension::ALL.to_vec(),
            measures: measures
                .iter()
                .map(|(s, n, y)| MeasureSpec::new(s, n, y))
                .collect(),
        },
    }
}

fn building_approvals() -> DatasetSpec {
    let key = "...TOT+150+130+134+133+132+131+120+122+121+110.AUS+STE..M".to_string();
    DatasetSpec {
        name: "building_approvals".into(),
        output_file: "build_app.csv".into(),
        frequency: Frequency::Monthly,
        source: Source::Api(ApiSource {
            versions: approvals_versions(&[key], "CL_STATE", true),
        }),
        constants: constants(&[(Dimension::AdjustmentType, "Original")]),
        replacements: vec![],
        keep: vec![],
        layout: OutputLayout {
            region_label: "State".into(),
            axes: approvals_axes(),
            measures: approvals_measures(),
        },
    }
}

fn building_approvals_sa2() -> DatasetSpec {
    let keys: Vec<String> = APPROVALS_BUILDING_TYPES
        .iter()
        .map(|code| format!("...{}.SA2..M", code))
        .collect();
    DatasetSpec {
        name: "building_approvals_sa2".into(),
        output_file: "build_app_sa2.csv".into(),
        frequency: Frequency::Monthly,
        source: Source::Api(ApiSource {
            versions: approvals_versions(&keys, "CL_SA2", false),
        }),
        constants: constants(&[(Dimension::AdjustmentType, "Original")]),
        replacements: vec![],
        keep: vec![],
        layout: OutputLayout {
            region_label: "Region".into(),
            axes: approvals_axes(),
            measures: approvals_measures(),
        },
    }
}

fn approvals_axes() -> Vec<Dimension> {
    vec![
        Dimension::Region,
        Dimension::RegionType,
        Dimension::BuildingWorkType,
        Dimension::Sector,
        Dimension::BuildingType,
        Dimension::AdjustmentType,
    ]
}

fn approvals_demolition() -> DatasetSpec {
    DatasetSpec {
        name: "approvals_demolition".into(),
        output_file: "building_approvals_demolition.csv".into(),
        frequency: Frequency::Quarterly,
        source: Source::Sheet(SheetSource {
            catalogue: "87310087".into(),
            release: ReleaseSeries::BuildingApprovals,
            sheet: "Data1".into(),
            skip_rows: 9,
            segments: vec![
                Axis::Measure,
                Axis::Dim(Dimension::BuildingType),
                Axis::Dim(Dimension::Region),
            ],
            measure_filter: None,
        }),
        constants: constants(&[
            (Dimension::RegionType, STATES_AND_TERRITORIES),
            (Dimension::BuildingWorkType, "Total Work"),
            (Dimension::Sector, "Total Sector"),
            (Dimension::AdjustmentType, "Original"),
        ]),
        replacements: vec![replace(Dimension::BuildingType, TOTAL_BUILDING_TYPE, "Total")],
        keep: vec![],
        layout: OutputLayout {
            region_label: "Region".into(),
            axes: approvals_axes(),
            measures: vec![MeasureSpec::new(
                "Dwelling Units Approved for Demolition",
                "Dwelling Units Approved for Demolition",
                "Year-End Dwelling Units Approved for Demolition",
            )],
        },
    }
}

fn work_not_yet_commenced() -> DatasetSpec {
    DatasetSpec {
        name: "work_not_yet_commenced".into(),
        output_file: "building_activity_value_of_work_not_yet_commenced.csv".into(),
        frequency: Frequency::Quarterly,
        source: Source::Sheet(SheetSource {
            catalogue: "87520079".into(),
            release: ReleaseSeries::BuildingActivity,
            sheet: "Data1".into(),
            skip_rows: 9,
            segments: vec![
                Axis::Measure,
                Axis::Dim(Dimension::BuildingType),
                Axis::Dim(Dimension::Region),
            ],
            // the workbook also carries "Value of work in the pipeline"
            measure_filter: Some("Value of work not yet commenced".into()),
        }),
        constants: constants(&[
            (Dimension::RegionType, STATES_AND_TERRITORIES),
            (Dimension::BuildingWorkType, "Total Work"),
            (Dimension::Sector, "Total Sector"),
            (Dimension::AdjustmentType, "Original"),
            (Dimension::PriceAdjustment, "Current Prices"),
        ]),
        replacements: vec![replace(Dimension::BuildingType, TOTAL_BUILDING_TYPE, "Total")],
        keep: vec![],
        layout: OutputLayout {
            region_label: "State".into(),
            axes: Dimension::ALL.to_vec(),
            measures: vec![MeasureSpec::new(
                "Value of work not yet commenced",
                "Value of work not yet commenced",
                "Year-End Value of Work Not Yet Commenced",
            )],
        },
    }
}

fn dwellings_not_yet_commenced() -> DatasetSpec {
    DatasetSpec {
        name: "dwellings_not_yet_commenced".into(),
        output_file: "building_activity_dwelling_units_not_yet_commenced.csv".into(),
        frequency: Frequency::Quarterly,
        source: Source::Sheet(SheetSource {
            catalogue: "87520080".into(),
            release: ReleaseSeries::BuildingActivity,
            sheet: "Data1".into(),
            skip_rows: 9,
            segments: vec![
                Axis::Measure,
                Axis::Dim(Dimension::BuildingType),
                Axis::Dim(Dimension::BuildingWorkType),
                Axis::Dim(Dimension::Region),
            ],
            measure_filter: None,
        }),
        constants: constants(&[
            (Dimension::RegionType, STATES_AND_TERRITORIES),
            (Dimension::Sector, "Total Sector"),
            (Dimension::AdjustmentType, "Original"),
            (Dimension::PriceAdjustment, "Current Prices"),
        ]),
        replacements: vec![
            replace(Dimension::BuildingType, TOTAL_BUILDING_TYPE, "Total"),
            replace(Dimension::BuildingWorkType, "Total (Type of Work)", "Total Work"),
        ],
        keep: vec![],
        layout: OutputLayout {
            region_label: "State".into(),
            axes: Dimension::ALL.to_vec(),
            measures: vec![MeasureSpec::new(
                "Dwelling Units Not Yet Commenced",
                "Dwelling Units Not Yet Commenced",
                "Year-End Dwelling Units Not Yet Commenced",
            )],
        },
    }
}

/// All published tables, in run order.
pub fn builtin() -> Vec<DatasetSpec> {
    vec![
        building_activity(),
        building_approvals(),
        building_approvals_sa2(),
        approvals_demolition(),
        work_not_yet_commenced(),
        dwellings_not_yet_commenced(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Vocabulary;

    #[test]
    fn every_codelist_is_known() {
        let vocab = Vocabulary::builtin();
        for ds in builtin() {
            if let Source::Api(api) = &ds.source {
                for v in &api.versions {
                    for c in &v.columns {
                        assert!(vocab.contains(&c.codelist), "{} uses {}", ds.name, c.codelist);
                    }
                }
            }
        }
    }

    #[test]
    fn every_axis_is_sourced_or_constant() {
        for ds in builtin() {
            let mut sourced: Vec<Dimension> = ds.constants.iter().map(|(d, _)| *d).collect();
            match &ds.source {
                Source::Api(api) => {
                    for c in &api.versions[0].columns {
                        if let Axis::Dim(d) = c.axis {
                            sourced.push(d);
                        }
                    }
                }
                Source::Sheet(sheet) => {
                    for a in &sheet.segments {
                        if let Axis::Dim(d) = a {
                            sourced.push(*d);
                        }
                    }
                }
            }
            for axis in &ds.layout.axes {
                assert!(sourced.contains(axis), "{} lacks {}", ds.name, axis);
            }
        }
    }

    #[test]
    fn api_urls_carry_flow_version_and_key() -> Result<()> {
        let ds = building_activity();
        let Source::Api(api) = &ds.source else {
            panic!("building activity is an API source");
        };
        let v = &api.versions[0];
        let url = v.url("https://data.api.abs.gov.au/rest/data/", &v.keys[0])?;
        assert_eq!(
            url.as_str(),
            "https://data.api.abs.gov.au/rest/data/ABS,BUILDING_ACTIVITY,1.0.0/..CUR....10.Q?dimensionAtObservation=AllDimensions"
        );
        Ok(())
    }

    #[test]
    fn release_labels_look_back() {
        let today = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        assert_eq!(ReleaseSeries::BuildingApprovals.label(today), "sep-2024");
        // 2024-05 falls in Q2, whose last month is June
        assert_eq!(ReleaseSeries::BuildingActivity.label(today), "jun-2024");
    }
}
