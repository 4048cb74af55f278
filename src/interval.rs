//! Validity windows built from two optional [`PartialDate`]s.
//!
//! An absent start means the window has been valid since the beginning of
//! time, an absent end that it stays valid indefinitely. Overlap is decided on
//! the spans of the partial dates, so `2015` as an end and `2015-06` as a start
//! overlap, since June 2015 lies within 2015.
//!
//! Touching boundaries: two windows sharing a single day overlap (an end of
//! `2015-06-30` and a start of `2015-06-30`). Windows that are merely adjacent,
//! such as an end of `2015` and a start of `2016`, do not; use
//! [`PartialDateInterval::is_adjacent`] to detect those.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

use crate::datatype::{DateRelation, PartialDate};
use crate::error::{PopoloError, Result};

#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(try_from = "IntervalFields")]
pub struct PartialDateInterval {
    #[serde(rename = "start_date")]
    start: Option<PartialDate>,
    #[serde(rename = "end_date")]
    end: Option<PartialDate>,
}

// unvalidated shape used while deserializing
#[derive(Deserialize)]
struct IntervalFields {
    #[serde(default)]
    start_date: Option<PartialDate>,
    #[serde(default)]
    end_date: Option<PartialDate>,
}

impl TryFrom<IntervalFields> for PartialDateInterval {
    type Error = PopoloError;
    fn try_from(fields: IntervalFields) -> Result<Self> {
        PartialDateInterval::new(fields.start_date, fields.end_date)
    }
}

impl PartialDateInterval {
    /// Fails when the start lies entirely after the end.
    pub fn new(start: Option<PartialDate>, end: Option<PartialDate>) -> Result<PartialDateInterval> {
        if let (Some(s), Some(e)) = (start, end) {
            if s.relate(&e) == DateRelation::Greater {
                return Err(PopoloError::InvalidInterval {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }
        Ok(PartialDateInterval { start, end })
    }
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<PartialDateInterval> {
        PartialDateInterval::new(PartialDate::parse_optional(start)?, PartialDate::parse_optional(end)?)
    }
    pub fn unbounded() -> PartialDateInterval {
        PartialDateInterval { start: None, end: None }
    }
    pub fn start(&self) -> Option<PartialDate> {
        self.start
    }
    pub fn end(&self) -> Option<PartialDate> {
        self.end
    }
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
    /// Inclusive number of days shared by both windows.
    ///
    /// `None` when the shared region has no start or no end. Zero means the
    /// windows are adjacent, a negative value is the size of the gap.
    pub fn overlap_days(&self, other: &PartialDateInterval) -> Option<i64> {
        let latest_start = match (self.start, other.start) {
            (None, None) => None,
            (Some(a), None) | (None, Some(a)) => Some(a.first_day()),
            (Some(a), Some(b)) => Some(a.first_day().max(b.first_day())),
        };
        let earliest_end = match (self.end, other.end) {
            (None, None) => None,
            (Some(a), None) | (None, Some(a)) => Some(a.last_day()),
            (Some(a), Some(b)) => Some(a.last_day().min(b.last_day())),
        };
        match (latest_start, earliest_end) {
            (Some(start), Some(end)) => Some((end - start).num_days() + 1),
            _ => None,
        }
    }
    pub fn overlaps(&self, other: &PartialDateInterval) -> bool {
        self.overlap_days(other).is_none_or(|days| days > 0)
    }
    pub fn is_adjacent(&self, other: &PartialDateInterval) -> bool {
        self.overlap_days(other) == Some(0)
    }
    /// The smallest window covering both, with open ends winning.
    pub fn merge(&self, other: &PartialDateInterval) -> PartialDateInterval {
        let start = match (self.start, other.start) {
            // Ord puts the earliest first day first, the coarser date on ties
            (Some(a), Some(b)) => Some(a.min(b)),
            _ => None,
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => [a, b]
                .into_iter()
                .max_by_key(|d| (d.last_day(), Reverse(d.precision()))),
            _ => None,
        };
        PartialDateInterval { start, end }
    }
    pub fn is_current_at(&self, day: NaiveDate) -> bool {
        self.start.is_none_or(|s| s.first_day() <= day) && self.end.is_none_or(|e| day <= e.last_day())
    }
    pub fn is_past_at(&self, day: NaiveDate) -> bool {
        self.end.is_some_and(|e| e.last_day() < day)
    }
    pub fn is_future_at(&self, day: NaiveDate) -> bool {
        self.start.is_some_and(|s| s.first_day() > day)
    }
}

impl fmt::Display for PartialDateInterval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.start, self.end) {
            (Some(s), Some(e)) => write!(f, "{} => {}", s, e),
            (Some(s), None) => write!(f, "{} => forever", s),
            (None, Some(e)) => write!(f, "forever => {}", e),
            (None, None) => write!(f, "forever => forever"),
        }
    }
}
