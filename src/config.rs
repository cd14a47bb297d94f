// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::fetch::RetryPolicy;
use crate::schema::{CodeTable, DatasetSpec, Vocabulary};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "absscraper.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SDMX REST data endpoint.
    pub api_base: String,
    /// Root under which release workbooks are published.
    pub release_base: String,
    pub output_dir: PathBuf,
    /// Also write a `.parquet` next to every CSV.
    pub parquet: bool,
    /// Queries in flight at once.
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Dataset names to run; empty runs all of them.
    pub datasets: Vec<String>,
    /// Extra or overriding codelists.
    pub codelists: BTreeMap<String, CodeTable>,
    pub report_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://data.api.abs.gov.au/rest/data/".into(),
            release_base: "https://www.abs.gov.au/statistics/industry/building-and-construction/"
                .into(),
            output_dir: PathBuf::from("output"),
            parquet: false,
            concurrency: 4,
            timeout_secs: 120,
            retry: RetryPolicy::default(),
            datasets: Vec::new(),
            codelists: BTreeMap::new(),
            report_file: "run_report.json".into(),
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing config YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    /// An explicit path must exist; otherwise fall back to
    /// `absscraper.yaml` if present, then to defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => {
                debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Built-in codelists plus the configured ones.
    pub fn vocabulary(&self) -> Result<Vocabulary> {
        let mut vocab = Vocabulary::builtin();
        vocab.extend(&self.codelists)?;
        Ok(vocab)
    }

    /// Keep the configured datasets, in catalog order. Unknown names are an error.
    pub fn select(&self, catalog: Vec<DatasetSpec>) -> Result<Vec<DatasetSpec>> {
        if self.datasets.is_empty() {
            return Ok(catalog);
        }
        for name in &self.datasets {
            if !catalog.iter().any(|d| &d.name == name) {
                let known: Vec<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
                bail!("unknown dataset {} (known: {})", name, known.join(", "));
            }
        }
        Ok(catalog
            .into_iter()
            .filter(|d| self.datasets.contains(&d.name))
            .collect())
    }
}
