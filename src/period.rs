// src/period.rs

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

static QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-?Q([1-4])$").expect("quarter regex should parse"));
static MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("month regex should parse"));

/// Sampling frequency of a series. Fixes the trailing window: one full year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Quarterly,
    Monthly,
}

impl Frequency {
    pub fn window(self) -> usize {
        match self {
            Frequency::Quarterly => 4,
            Frequency::Monthly => 12,
        }
    }

    /// Column header of the time axis in the published output.
    pub fn label(self) -> &'static str {
        match self {
            Frequency::Quarterly => "Quarter",
            Frequency::Monthly => "Month",
        }
    }
}

/// A reporting period. Ordering is chronological within one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Quarter { year: i32, quarter: u32 },
    Month { year: i32, month: u32 },
}

impl Period {
    /// Accepts `2020Q1`, `2020-Q1` (SDMX) and `2020-01`.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let s = raw.trim();
        if let Some(caps) = QUARTER_RE.captures(s) {
            let year = caps[1]
                .parse()
                .map_err(|_| PipelineError::InvalidPeriod(raw.to_string()))?;
            let quarter = caps[2]
                .parse()
                .map_err(|_| PipelineError::InvalidPeriod(raw.to_string()))?;
            return Ok(Period::Quarter { year, quarter });
        }
        if let Some(caps) = MONTH_RE.captures(s) {
            let year = caps[1]
                .parse()
                .map_err(|_| PipelineError::InvalidPeriod(raw.to_string()))?;
            let month: u32 = caps[2]
                .parse()
                .map_err(|_| PipelineError::InvalidPeriod(raw.to_string()))?;
            if (1..=12).contains(&month) {
                return Ok(Period::Month { year, month });
            }
        }
        Err(PipelineError::InvalidPeriod(raw.to_string()))
    }

    /// The period containing `date` at the given frequency.
    pub fn containing(date: NaiveDate, freq: Frequency) -> Self {
        match freq {
            Frequency::Quarterly => Period::Quarter {
                year: date.year(),
                quarter: (date.month() - 1) / 3 + 1,
            },
            Frequency::Monthly => Period::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            Period::Quarter { .. } => Frequency::Quarterly,
            Period::Month { .. } => Frequency::Monthly,
        }
    }

    /// Last calendar day of the period.
    pub fn end_date(&self) -> NaiveDate {
        let (year, last_month) = match *self {
            Period::Quarter { year, quarter } => (year, quarter * 3),
            Period::Month { year, month } => (year, month),
        };
        let (next_year, next_month) = if last_month == 12 {
            (year + 1, 1)
        } else {
            (year, last_month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// The period immediately after this one.
    pub fn succ(&self) -> Self {
        match *self {
            Period::Quarter { year, quarter: 4 } => Period::Quarter {
                year: year + 1,
                quarter: 1,
            },
            Period::Quarter { year, quarter } => Period::Quarter {
                year,
                quarter: quarter + 1,
            },
            Period::Month { year, month: 12 } => Period::Month {
                year: year + 1,
                month: 1,
            },
            Period::Month { year, month } => Period::Month {
                year,
                month: month + 1,
            },
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Quarter { year, quarter } => write!(f, "{}Q{}", year, quarter),
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sdmx_and_pandas_labels() {
        assert_eq!(
            Period::parse("2020-Q3").unwrap(),
            Period::Quarter { year: 2020, quarter: 3 }
        );
        assert_eq!(
            Period::parse("2020Q3").unwrap(),
            Period::Quarter { year: 2020, quarter: 3 }
        );
        assert_eq!(
            Period::parse(" 2021-07 ").unwrap(),
            Period::Month { year: 2021, month: 7 }
        );
        assert!(Period::parse("2021-13").is_err());
        assert!(Period::parse("Q1 2020").is_err());
    }

    #[test]
    fn end_dates_are_last_calendar_day() {
        let q1 = Period::parse("2020Q1").unwrap();
        assert_eq!(q1.end_date(), NaiveDate::from_ymd_opt(2020, 3, 31).unwrap());
        let q4 = Period::parse("2020Q4").unwrap();
        assert_eq!(q4.end_date(), NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
        let feb = Period::parse("2024-02").unwrap();
        assert_eq!(feb.end_date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for label in ["1984Q3", "2023-12"] {
            assert_eq!(Period::parse(label).unwrap().to_string(), label);
        }
        let q4 = Period::Quarter { year: 2019, quarter: 4 };
        assert_eq!(q4.succ().to_string(), "2020Q1");
    }

    #[test]
    fn containing_maps_dates_to_quarters() {
        let d = NaiveDate::from_ymd_opt(1984, 9, 1).unwrap();
        assert_eq!(Period::containing(d, Frequency::Quarterly).to_string(), "1984Q3");
        assert_eq!(Period::containing(d, Frequency::Monthly).to_string(), "1984-09");
    }
}
