// src/pipeline.rs
//! Runs one dataset definition end to end: fetch, decode, reshape,
//! aggregate, finalize. Row-level problems are tallied into a
//! `DatasetReport` instead of aborting, so one bad dataset never stops the
//! others.

use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::decode::{decode_api, decode_sheet};
use crate::error::{ErrorKind, PipelineError};
use crate::fetch::{gather, Fetch, Query, QueryKind, Sleeper};
use crate::ingest::{xlsx, Payload};
use crate::reshape::{filter_measures, merge_versions, repivot, FactRow, MeasureRow};
use crate::rolling::{check_placeholders, rolling_sums};
use crate::schema::{to_record_batch, DatasetSpec, Source, Vocabulary};
use crate::{finalize, write};

/// Messages kept per category in the report; counts are always complete.
const MAX_MESSAGES_PER_KIND: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    /// Output written, but rows were rejected or optional queries failed.
    Warning,
    /// A fatal error occurred. Rows that survived are still written unless
    /// the whole dataset was aborted.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub status: Status,
    pub rows: usize,
    pub rejected: BTreeMap<ErrorKind, usize>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub datasets: Vec<DatasetReport>,
}

impl RunReport {
    pub fn failed(&self) -> bool {
        self.datasets.iter().any(|d| d.status == Status::Failed)
    }
}

/// Accumulates errors for one dataset.
#[derive(Debug, Default)]
struct Tally {
    counts: BTreeMap<ErrorKind, usize>,
    messages: Vec<String>,
    fatal: bool,
    /// Nothing is published for the dataset.
    aborted: bool,
}

impl Tally {
    fn record(&mut self, err: PipelineError) {
        let kind = err.kind();
        let n = self.counts.entry(kind).or_default();
        *n += 1;
        if *n <= MAX_MESSAGES_PER_KIND {
            self.messages.push(err.to_string());
        }
        if kind.is_fatal() {
            self.fatal = true;
        }
        if kind.aborts_dataset() {
            self.aborted = true;
        }
    }

    fn extend(&mut self, errs: impl IntoIterator<Item = PipelineError>) {
        for e in errs {
            self.record(e);
        }
    }

    fn abort(&mut self, reason: String) {
        self.messages.push(reason);
        self.fatal = true;
        self.aborted = true;
    }

    fn into_report(self, dataset: &str, rows: usize) -> DatasetReport {
        let status = if self.fatal {
            Status::Failed
        } else if self.messages.is_empty() {
            Status::Ok
        } else {
            Status::Warning
        };
        DatasetReport {
            dataset: dataset.to_string(),
            status,
            rows,
            rejected: self.counts,
            errors: self.messages,
            outputs: Vec::new(),
        }
    }
}

/// Result of one dataset: the finalized table (absent on failure) and its report.
#[derive(Debug)]
pub struct Outcome {
    pub batch: Option<RecordBatch>,
    pub report: DatasetReport,
}

pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub vocab: &'a Vocabulary,
    pub fetcher: &'a dyn Fetch,
    pub sleeper: &'a dyn Sleeper,
    /// Reference date for release labels.
    pub today: NaiveDate,
}

impl<'a> Pipeline<'a> {
    /// Every query the dataset needs, each tagged with its API version index.
    pub fn queries(&self, spec: &DatasetSpec) -> Result<Vec<(usize, Query)>> {
        match &spec.source {
            Source::Api(api) => {
                let mut out = Vec::new();
                for (i, version) in api.versions.iter().enumerate() {
                    for key in &version.keys {
                        out.push((
                            i,
                            Query {
                                name: format!("{}/{}/{}", spec.name, version.name, key),
                                url: version.url(&self.config.api_base, key)?,
                                kind: QueryKind::SdmxCsv,
                                required: version.required,
                            },
                        ));
                    }
                }
                Ok(out)
            }
            Source::Sheet(sheet) => Ok(vec![(
                0,
                Query {
                    name: format!("{}/{}", spec.name, sheet.catalogue),
                    url: sheet.url(&self.config.release_base, self.today)?,
                    kind: QueryKind::Workbook {
                        sheet: sheet.sheet.clone(),
                    },
                    required: true,
                },
            )]),
        }
    }

    /// Run one dataset. Never returns an error: everything that goes wrong
    /// ends up in the report.
    #[instrument(level = "info", skip_all, fields(dataset = %spec.name))]
    pub async fn run_dataset(&self, spec: &DatasetSpec) -> Outcome {
        let mut tally = Tally::default();
        let batch = match self.process(spec, &mut tally).await {
            Ok(Some(batch)) => Some(batch),
            Ok(None) => None,
            Err(e) => {
                error!(error = %format!("{:#}", e), "dataset aborted");
                tally.abort(format!("{:#}", e));
                None
            }
        };
        let rows = batch.as_ref().map_or(0, RecordBatch::num_rows);
        let report = tally.into_report(&spec.name, rows);
        info!(rows, status = ?report.status, rejected = ?report.rejected, "dataset done");
        Outcome { batch, report }
    }

    async fn process(&self, spec: &DatasetSpec, tally: &mut Tally) -> Result<Option<RecordBatch>> {
        let tagged = self.queries(spec)?;
        let (versions, queries): (Vec<usize>, Vec<Query>) = tagged.into_iter().unzip();
        let total = queries.len();
        let results = gather(
            self.fetcher,
            queries,
            &self.config.retry,
            self.sleeper,
            self.config.concurrency,
        )
        .await;

        let mut per_version: Vec<Vec<FactRow>> = Vec::new();
        let mut fetched = 0usize;
        for (version, (query, result)) in versions.into_iter().zip(results) {
            let payload = match result {
                Ok(p) => p,
                Err(e) => {
                    if query.required {
                        tally.abort(format!("required query failed: {}", e));
                    } else {
                        warn!(query = %query.name, "optional query failed; continuing without it");
                    }
                    tally.record(e);
                    continue;
                }
            };
            fetched += 1;
            if per_version.len() <= version {
                per_version.resize_with(version + 1, Vec::new);
            }
            let facts = self.decode(spec, version, payload, tally)?;
            per_version[version].extend(facts);
        }
        if fetched == 0 {
            tally.abort(format!("all {} queries failed", total));
        }
        if tally.aborted {
            return Ok(None);
        }

        let facts = merge_versions(per_version);
        let facts = filter_measures(facts, &spec.measure_sources());
        let repivoted = repivot(facts, &spec.measure_sources());
        tally.extend(repivoted.errors);
        let mut rows: Vec<MeasureRow> = repivoted.rows;

        tally.extend(check_placeholders(&rows));
        if tally.aborted {
            return Ok(None);
        }

        rows.retain(|r| {
            spec.keep
                .iter()
                .all(|(dim, label)| r.dims.get(*dim) == Some(label.as_str()))
        });
        let aggregated = rolling_sums(rows, spec.frequency);
        if tally.fatal {
            if aggregated.is_empty() {
                return Ok(None);
            }
            warn!(rows = aggregated.len(), "publishing surviving rows of a failed dataset");
        }
        let raw = to_record_batch(&aggregated, &spec.layout)?;
        let batch = finalize::finalize(&raw, &spec.layout, spec.frequency)?;
        Ok(Some(batch))
    }

    fn decode(
        &self,
        spec: &DatasetSpec,
        version: usize,
        payload: Payload,
        tally: &mut Tally,
    ) -> Result<Vec<FactRow>> {
        match (&spec.source, payload) {
            (Source::Api(api), Payload::Table(table)) => {
                let v = api
                    .versions
                    .get(version)
                    .ok_or_else(|| anyhow!("no API version {}", version))?;
                match decode_api(&table, v, self.vocab, spec) {
                    Ok(decoded) => {
                        tally.extend(decoded.errors);
                        Ok(decoded.facts)
                    }
                    Err(e) => {
                        tally.record(e);
                        Ok(Vec::new())
                    }
                }
            }
            (Source::Sheet(sheet), Payload::Sheet(raw)) => {
                let (wide, errors) = xlsx::to_wide(&raw, sheet.skip_rows, spec.frequency);
                tally.extend(errors);
                let decoded = decode_sheet(wide.unpivot(), sheet, spec);
                tally.extend(decoded.errors);
                Ok(decoded.facts)
            }
            _ => Err(anyhow!("payload shape does not match the source of {}", spec.name)),
        }
    }

    /// Run every dataset, write outputs and the run report.
    pub async fn run(&self, specs: &[DatasetSpec]) -> Result<RunReport> {
        let started_at = Utc::now();
        let out_dir = &self.config.output_dir;
        let mut datasets = Vec::with_capacity(specs.len());

        for spec in specs {
            let Outcome { batch, mut report } = self.run_dataset(spec).await;
            if let Some(batch) = batch {
                report
                    .outputs
                    .push(write::write_csv(&batch, out_dir, &spec.output_file)?);
                if self.config.parquet {
                    let stem = spec
                        .output_file
                        .strip_suffix(".csv")
                        .unwrap_or(&spec.output_file);
                    report.outputs.push(write::write_parquet(
                        &batch,
                        out_dir,
                        &format!("{}.parquet", stem),
                    )?);
                }
            }
            datasets.push(report);
        }

        let report = RunReport {
            started_at,
            datasets,
        };
        let path = write::write_json(&report, out_dir, &self.config.report_file)?;
        info!(path = %path.display(), "wrote run report");
        Ok(report)
    }
}
