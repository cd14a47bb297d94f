// src/rolling.rs

use std::collections::{BTreeMap, BTreeSet};
use tracing::{instrument, warn};

use crate::error::PipelineError;
use crate::period::{Frequency, Period};
use crate::reshape::MeasureRow;
use crate::schema::{Dimension, DimensionValues};

/// A `MeasureRow` plus the trailing-year sum of each of its measures.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub dims: DimensionValues,
    pub period: Period,
    pub values: Vec<Option<f64>>,
    /// `None` until the window is full and every value in it is present.
    pub year_end: Vec<Option<f64>>,
}

/// Fail on labels that differ only by case or surrounding whitespace on the
/// same axis ("Total Sector" vs "Total sector "). Grouping by them would
/// silently split one series in two.
pub fn check_placeholders(rows: &[MeasureRow]) -> Vec<PipelineError> {
    let mut labels: BTreeMap<Dimension, BTreeSet<&str>> = BTreeMap::new();
    for row in rows {
        for (dim, label) in row.dims.iter() {
            labels.entry(dim).or_default().insert(label);
        }
    }

    let mut errors = Vec::new();
    for (dim, set) in labels {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for label in set {
            let folded = label.trim().to_lowercase();
            match seen.get(&folded) {
                Some(first) => errors.push(PipelineError::InconsistentPlaceholder {
                    axis: dim.to_string(),
                    first: first.to_string(),
                    second: label.to_string(),
                }),
                None => {
                    seen.insert(folded, label);
                }
            }
        }
    }
    errors
}

/// Trailing-window sums per group of identical dimension values.
///
/// Rows are sorted by (group, period) first; input order is irrelevant. The
/// window is row-based: a row and the `window - 1` rows before it in its
/// group. One output row per input row.
#[instrument(level = "debug", skip(rows), fields(rows = rows.len()))]
pub fn rolling_sums(mut rows: Vec<MeasureRow>, freq: Frequency) -> Vec<AggregateRow> {
    let window = freq.window();
    rows.sort_by(|a, b| (&a.dims, a.period).cmp(&(&b.dims, b.period)));

    let mut out = Vec::with_capacity(rows.len());
    let mut start = 0;
    while start < rows.len() {
        let end = rows[start..]
            .iter()
            .position(|r| r.dims != rows[start].dims)
            .map_or(rows.len(), |n| start + n);
        aggregate_group(&rows[start..end], window, &mut out);
        start = end;
    }
    out
}

fn aggregate_group(group: &[MeasureRow], window: usize, out: &mut Vec<AggregateRow>) {
    let gaps = group
        .windows(2)
        .filter(|pair| pair[0].period.succ() != pair[1].period)
        .count();
    if gaps > 0 {
        if let Some(first) = group.first() {
            warn!(group = %first.dims, gaps, "period gaps inside group; window stays row-based");
        }
    }

    for (i, row) in group.iter().enumerate() {
        let year_end = (0..row.values.len())
            .map(|m| {
                if i + 1 < window {
                    return None;
                }
                group[i + 1 - window..=i]
                    .iter()
                    .map(|r| r.values.get(m).copied().flatten())
                    .sum::<Option<f64>>()
            })
            .collect();
        out.push(AggregateRow {
            dims: row.dims.clone(),
            period: row.period,
            values: row.values.clone(),
            year_end,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(region: &str, period: &str, value: Option<f64>) -> MeasureRow {
        MeasureRow {
            dims: DimensionValues::new()
                .with(Dimension::Region, region)
                .with(Dimension::Sector, "Total Sector"),
            period: Period::parse(period).unwrap(),
            values: vec![value],
        }
    }

    fn quarters(n: usize) -> Vec<String> {
        let mut p = Period::parse("2019Q1").unwrap();
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(p.to_string());
            p = p.succ();
        }
        out
    }

    #[test]
    fn constant_series_sums_once_window_is_full() {
        let rows = quarters(8)
            .iter()
            .map(|q| row("NSW", q, Some(2.5)))
            .collect();
        let out = rolling_sums(rows, Frequency::Quarterly);
        assert_eq!(out.len(), 8);
        for (i, r) in out.iter().enumerate() {
            if i < 3 {
                assert_eq!(r.year_end, vec![None], "row {}", i + 1);
            } else {
                assert_eq!(r.year_end, vec![Some(10.0)], "row {}", i + 1);
            }
        }
    }

    #[test]
    fn groups_never_mix() {
        let mut rows = Vec::new();
        // interleaved and out of order
        for q in quarters(4).iter().rev() {
            rows.push(row("NSW", q, Some(1.0)));
            rows.push(row("VIC", q, Some(100.0)));
        }
        let out = rolling_sums(rows, Frequency::Quarterly);
        let nsw: Vec<_> = out
            .iter()
            .filter(|r| r.dims.get(Dimension::Region) == Some("NSW"))
            .collect();
        assert_eq!(nsw.len(), 4);
        assert_eq!(nsw[0].period.to_string(), "2019Q1");
        assert_eq!(nsw[3].year_end, vec![Some(4.0)]);

        let vic_last = out.last().unwrap();
        assert_eq!(vic_last.dims.get(Dimension::Region), Some("VIC"));
        assert_eq!(vic_last.year_end, vec![Some(400.0)]);
    }

    #[test]
    fn groups_split_on_a_single_placeholder_at_every_window() {
        for (freq, start) in [(Frequency::Quarterly, "2019Q1"), (Frequency::Monthly, "2019-01")] {
            let window = freq.window();
            let mut p = Period::parse(start).unwrap();
            let mut rows = Vec::new();
            for _ in 0..window + 2 {
                rows.push(row("NSW", &p.to_string(), Some(1.0)));
                let mut private = row("NSW", &p.to_string(), Some(1000.0));
                private.dims.set(Dimension::Sector, "Private Sector");
                rows.push(private);
                p = p.succ();
            }

            let out = rolling_sums(rows, freq);
            assert_eq!(out.len(), 2 * (window + 2));
            for sector in ["Total Sector", "Private Sector"] {
                let per = if sector == "Total Sector" { 1.0 } else { 1000.0 };
                let sums: Vec<_> = out
                    .iter()
                    .filter(|r| r.dims.get(Dimension::Sector) == Some(sector))
                    .map(|r| r.year_end[0])
                    .collect();
                assert_eq!(sums.len(), window + 2, "{} {:?}", sector, freq);
                assert!(sums[..window - 1].iter().all(Option::is_none), "{:?}", freq);
                assert!(
                    sums[window - 1..].iter().all(|s| *s == Some(per * window as f64)),
                    "{} {:?}: {:?}",
                    sector,
                    freq,
                    sums
                );
            }
        }
    }

    #[test]
    fn absent_value_poisons_its_windows_only() {
        let qs = quarters(6);
        let rows: Vec<_> = qs
            .iter()
            .enumerate()
            .map(|(i, q)| row("NSW", q, if i == 1 { None } else { Some(1.0) }))
            .collect();
        let out = rolling_sums(rows, Frequency::Quarterly);
        let sums: Vec<_> = out.iter().map(|r| r.year_end[0]).collect();
        assert_eq!(sums, vec![None, None, None, None, None, Some(4.0)]);
    }

    #[test]
    fn monthly_window_is_twelve() {
        let mut p = Period::parse("2020-01").unwrap();
        let mut rows = Vec::new();
        for _ in 0..12 {
            rows.push(row("NSW", &p.to_string(), Some(1.0)));
            p = p.succ();
        }
        let out = rolling_sums(rows, Frequency::Monthly);
        assert_eq!(out[10].year_end, vec![None]);
        assert_eq!(out[11].year_end, vec![Some(12.0)]);
    }

    #[test]
    fn near_identical_placeholders_are_flagged() {
        let mut a = row("NSW", "2020Q1", Some(1.0));
        let b = row("NSW", "2020Q2", Some(1.0));
        a.dims.set(Dimension::Sector, "Total sector ");
        let errors = check_placeholders(&[a, b]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            PipelineError::InconsistentPlaceholder { axis, .. } if axis == "sector"
        ));
        assert!(check_placeholders(&[row("NSW", "2020Q1", None)]).is_empty());
    }
}
