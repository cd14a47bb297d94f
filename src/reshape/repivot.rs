// src/reshape/repivot.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::period::Period;
use crate::schema::DimensionValues;

/// Long-format unit: one value for one (dimensions, period, measure).
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub dims: DimensionValues,
    pub period: Period,
    pub measure: String,
    pub value: Option<f64>,
}

/// One (dimensions, period) with a value slot per tracked measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureRow {
    pub dims: DimensionValues,
    pub period: Period,
    pub values: Vec<Option<f64>>,
}

/// Drop facts for measures we don't publish (e.g. "Value of work in the
/// pipeline" bundled next to "Value of work not yet commenced").
pub fn filter_measures(facts: Vec<FactRow>, keep: &[String]) -> Vec<FactRow> {
    let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();
    let kept: Vec<FactRow> = facts
        .into_iter()
        .filter(|f| {
            let ok = keep.contains(f.measure.as_str());
            if !ok {
                *dropped.entry(f.measure.clone()).or_default() += 1;
            }
            ok
        })
        .collect();
    for (measure, n) in &dropped {
        debug!(measure = %measure, rows = n, "discarded untracked measure");
    }
    kept
}

/// Concatenate facts from several schema versions. An observation present in
/// more than one version with the same value is kept once; differing values
/// are all kept so that `repivot` reports the collision.
pub fn merge_versions(versions: Vec<Vec<FactRow>>) -> Vec<FactRow> {
    let mut seen: HashMap<(DimensionValues, Period, String), Option<u64>> = HashMap::new();
    let mut merged = Vec::new();
    let mut overlapping = 0usize;

    for facts in versions {
        for f in facts {
            let key = (f.dims.clone(), f.period, f.measure.clone());
            let bits = f.value.map(f64::to_bits);
            match seen.get(&key) {
                Some(prev) if *prev == bits => {
                    overlapping += 1;
                    continue;
                }
                Some(_) => {
                    warn!(dims = %f.dims, period = %f.period, measure = %f.measure, "versions disagree");
                }
                None => {
                    seen.insert(key, bits);
                }
            }
            merged.push(f);
        }
    }
    if overlapping > 0 {
        debug!(overlapping, "identical observations shared across versions");
    }
    merged
}

#[derive(Debug, Default)]
pub struct Repivoted {
    /// Sorted by (dimensions, period).
    pub rows: Vec<MeasureRow>,
    /// One `DuplicateKey` per collision; those groups are absent from `rows`.
    pub errors: Vec<PipelineError>,
}

/// Promote each tracked measure into its own slot keyed by
/// (dimensions, period). Never resolves a collision by overwriting: the
/// whole group is withheld and the collision reported.
pub fn repivot(facts: Vec<FactRow>, measures: &[String]) -> Repivoted {
    let slot_of: HashMap<&str, usize> = measures
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_str(), i))
        .collect();

    // outer Option: slot filled yet?
    let mut cells: BTreeMap<(DimensionValues, Period), Vec<Option<Option<f64>>>> = BTreeMap::new();
    let mut poisoned: BTreeSet<DimensionValues> = BTreeSet::new();
    let mut errors = Vec::new();

    for f in facts {
        let Some(&slot) = slot_of.get(f.measure.as_str()) else {
            debug!(measure = %f.measure, "untracked measure reached repivot");
            continue;
        };
        let row = cells
            .entry((f.dims.clone(), f.period))
            .or_insert_with(|| vec![None; measures.len()]);
        if row[slot].is_some() {
            errors.push(PipelineError::DuplicateKey {
                key: format!("{} @ {}", f.dims, f.period),
                measure: f.measure.clone(),
            });
            poisoned.insert(f.dims);
            continue;
        }
        row[slot] = Some(f.value);
    }

    let rows = cells
        .into_iter()
        .filter(|((dims, _), _)| !poisoned.contains(dims))
        .map(|((dims, period), slots)| MeasureRow {
            dims,
            period,
            values: slots.into_iter().map(Option::flatten).collect(),
        })
        .collect();

    if !poisoned.is_empty() {
        warn!(groups = poisoned.len(), "groups withheld on duplicate keys");
    }
    Repivoted { rows, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Dimension;

    fn fact(region: &str, period: &str, measure: &str, value: f64) -> FactRow {
        FactRow {
            dims: DimensionValues::new().with(Dimension::Region, region),
            period: Period::parse(period).unwrap(),
            measure: measure.into(),
            value: Some(value),
        }
    }

    fn measures() -> Vec<String> {
        vec!["Commenced".into(), "Completed".into()]
    }

    #[test]
    fn measures_become_columns() {
        let out = repivot(
            vec![
                fact("NSW", "2020Q1", "Completed", 2.0),
                fact("NSW", "2020Q1", "Commenced", 1.0),
                fact("NSW", "2020Q2", "Commenced", 3.0),
            ],
            &measures(),
        );
        assert!(out.errors.is_empty());
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].values, vec![Some(1.0), Some(2.0)]);
        assert_eq!(out.rows[1].values, vec![Some(3.0), None]);
    }

    #[test]
    fn duplicate_key_withholds_the_group() {
        let out = repivot(
            vec![
                fact("NSW", "2020Q1", "Commenced", 1.0),
                fact("NSW", "2020Q1", "Commenced", 5.0),
                fact("NSW", "2020Q2", "Commenced", 2.0),
                fact("VIC", "2020Q1", "Commenced", 7.0),
            ],
            &measures(),
        );
        assert_eq!(out.errors.len(), 1);
        assert!(matches!(out.errors[0], PipelineError::DuplicateKey { .. }));
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].dims.get(Dimension::Region), Some("VIC"));
    }

    #[test]
    fn filter_drops_untracked_measures() {
        let kept = filter_measures(
            vec![
                fact("NSW", "2020Q1", "Commenced", 1.0),
                fact("NSW", "2020Q1", "Value of work in the pipeline", 9.0),
            ],
            &measures(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].measure, "Commenced");
    }

    #[test]
    fn merge_dedupes_agreeing_versions_and_keeps_conflicts() {
        let old = vec![
            fact("NSW", "2021-06", "Commenced", 1.0),
            fact("NSW", "2021-07", "Commenced", 2.0),
        ];
        let new = vec![
            fact("NSW", "2021-07", "Commenced", 2.0),
            fact("NSW", "2021-08", "Commenced", 3.0),
        ];
        assert_eq!(merge_versions(vec![old.clone(), new]).len(), 3);

        let conflicting = vec![fact("NSW", "2021-07", "Commenced", 4.0)];
        let merged = merge_versions(vec![old, conflicting]);
        assert_eq!(merged.len(), 3);
        let out = repivot(merged, &measures());
        assert_eq!(out.errors.len(), 1);
        assert!(out.rows.is_empty());
    }
}
