// src/schema/vocab.rs

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A codelist as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeTable {
    /// Short code → published label.
    Labels { codes: BTreeMap<String, String> },
    /// Codes that are already the canonical value (e.g. 9-digit SA2 codes),
    /// accepted only when they match `pattern`.
    Identifier { pattern: String },
}

#[derive(Debug, Clone)]
enum Codelist {
    Labels(HashMap<String, String>),
    Identifier(Regex),
}

/// Every codelist known to the run. Built once, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    lists: HashMap<String, Codelist>,
}

impl Vocabulary {
    /// Built-in ABS codelists for the building activity and approvals flows.
    pub fn builtin() -> Self {
        let mut vocab = Vocabulary::default();
        for (name, entries) in BUILTIN_LABELS {
            let codes = entries
                .iter()
                .map(|(c, l)| (c.to_string(), l.to_string()))
                .collect();
            vocab.lists.insert(name.to_string(), Codelist::Labels(codes));
        }
        for (name, pattern) in BUILTIN_IDENTIFIERS {
            // patterns are literals above; a failure here is a programming error
            if let Ok(re) = Regex::new(pattern) {
                vocab.lists.insert(name.to_string(), Codelist::Identifier(re));
            }
        }
        vocab
    }

    /// Add or replace codelists. Label tables are merged code by code.
    pub fn extend(&mut self, tables: &BTreeMap<String, CodeTable>) -> Result<()> {
        for (name, table) in tables {
            match table {
                CodeTable::Labels { codes } => {
                    let incoming: HashMap<String, String> =
                        codes.iter().map(|(c, l)| (c.clone(), l.clone())).collect();
                    match self.lists.get_mut(name) {
                        Some(Codelist::Labels(existing)) => existing.extend(incoming),
                        _ => {
                            self.lists.insert(name.clone(), Codelist::Labels(incoming));
                        }
                    }
                }
                CodeTable::Identifier { pattern } => {
                    let re = Regex::new(pattern)
                        .with_context(|| format!("compiling pattern for codelist {}", name))?;
                    self.lists.insert(name.clone(), Codelist::Identifier(re));
                }
            }
            debug!(codelist = %name, "codelist loaded from config");
        }
        Ok(())
    }

    /// Whether `codelist` is known.
    #[cfg(test)]
    pub(crate) fn contains(&self, codelist: &str) -> bool {
        self.lists.contains_key(codelist)
    }

    /// Label for `code`, or `None` when the code (or the codelist) is unknown.
    pub fn decode(&self, codelist: &str, code: &str) -> Option<String> {
        match self.lists.get(codelist)? {
            Codelist::Labels(codes) => codes.get(code.trim()).cloned(),
            Codelist::Identifier(re) => {
                let code = code.trim();
                re.is_match(code).then(|| code.to_string())
            }
        }
    }
}

const STATES: &[(&str, &str)] = &[
    ("1", "New South Wales"),
    ("2", "Victoria"),
    ("3", "Queensland"),
    ("4", "South Australia"),
    ("5", "Western Australia"),
    ("6", "Tasmania"),
    ("7", "Northern Territory"),
    ("8", "Australian Capital Territory"),
    ("AUS", "Australia"),
];

const BUILDING_TYPES: &[(&str, &str)] = &[
    ("TOT", "All Buildings"),
    ("100", "Total Residential"),
    ("110", "Houses"),
    ("120", "Semi-detached, row or terrace houses, townhouses - Total"),
    ("121", "Semi-detached, row or terrace houses, townhouses - One storey"),
    ("122", "Semi-detached, row or terrace houses, townhouses - Two or more storeys"),
    ("130", "Apartments - Total including those attached to a house"),
    ("131", "Apartments - In a one or two storey block"),
    ("132", "Apartments - In a three storey block"),
    ("133", "Apartments - In a four to eight storey block"),
    ("134", "Apartments - In a nine or more storey block"),
    ("150", "Total Other Residential"),
    ("700", "Total Non-Residential"),
];

const BUILTIN_LABELS: &[(&str, &[(&str, &str)])] = &[
    (
        "CL_ACT_MEASURE",
        &[
            ("1", "Number of dwelling units commenced"),
            ("2", "Number of dwelling units completed"),
            ("3", "Number of dwelling units under construction"),
            ("4", "Value of work commenced"),
            ("5", "Value of work completed"),
            ("6", "Value of work under construction"),
            ("7", "Value of work done during quarter"),
            ("8", "Value of work yet to be done"),
        ],
    ),
    ("CL_STATE", STATES),
    (
        "CL_PRICE_ADJ",
        &[("CUR", "Current Prices"), ("CVM", "Chain Volume Measures")],
    ),
    (
        "CL_BLD_WORK_TYPE",
        &[
            ("TOT", "Total Work"),
            ("1", "New Work"),
            ("2", "Alterations and Additions"),
        ],
    ),
    (
        "CL_SECTOR",
        &[
            ("TOT", "Total Sector"),
            ("1", "Private Sector"),
            ("2", "Public Sector"),
        ],
    ),
    // the 2016-21 approvals flow codes the sector total as 9
    (
        "CL_SECTOR_2016",
        &[
            ("9", "Total Sector"),
            ("1", "Private Sector"),
            ("2", "Public Sector"),
        ],
    ),
    ("CL_TYPE_BLDG", BUILDING_TYPES),
    (
        "CL_TSEST",
        &[
            ("10", "Original"),
            ("20", "Seasonally Adjusted"),
            ("30", "Trend"),
        ],
    ),
    (
        "CL_BA_MEASURE",
        &[
            ("1", "Number of dwelling units"),
            ("2", "Value of building jobs"),
        ],
    ),
    (
        "CL_REGION_TYPE",
        &[
            ("AUS", "Australia"),
            ("STE", "States and Territories"),
            ("SA2", "Statistical Area Level 2"),
        ],
    ),
];

const BUILTIN_IDENTIFIERS: &[(&str, &str)] = &[("CL_SA2", r"^\d{9}$")];
