// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// dates are backed by chrono, partial ones by their first and last day
use chrono::{Datelike, Days, Duration, Months, NaiveDate};
// used for ownership shares
use bigdecimal::BigDecimal;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

// used when parsing a string to a PartialDate
use std::str::FromStr;
// used to print out readable forms of a data type
use std::fmt;
use std::cmp::Ordering;
use std::ops;

use crate::error::{PopoloError, Result};

lazy_static! {
    // YYYY, YYYY-MM or YYYY-MM-DD, nothing else
    static ref PARTIAL_DATE: Regex =
        Regex::new(r"^([0-9]{4})(?:-([0-9]{2}))?(?:-([0-9]{2}))?$").unwrap();
}

pub const MAX_YEAR: i32 = 9999;

/// How much of a date is known. Coarser precisions sort first.
#[derive(Eq, PartialEq, PartialOrd, Ord, Debug, Hash, Clone, Copy)]
pub enum Precision {
    Year,
    Month,
    Day,
}

/// Outcome of comparing the spans of two partial dates.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DateRelation {
    Less,
    Equal,
    Greater,
    /// The spans intersect without being the same, e.g. `2020` and `2020-05`.
    Incomparable,
}

/// A calendar date where the month, or the month and the day, may be unknown.
///
/// A partial date covers a span of days: `2020` spans the whole of 2020 and
/// `2020-02` spans February 2020. Overlap tests use the span, while the
/// [`Ord`] implementation gives a strict display ordering in which a less
/// precise date sorts immediately before the more precise dates starting on
/// the same day (`2020 < 2020-01 < 2020-01-01 < 2020-01-02 < 2020-02`). That
/// ordering is the same as the lexicographic ordering of the textual forms.
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct PartialDate {
    first: NaiveDate,
    last: NaiveDate,
    precision: Precision,
}

impl PartialDate {
    pub fn from_parts(year: i32, month: Option<u32>, day: Option<u32>) -> Result<PartialDate> {
        let rendered = match (month, day) {
            (Some(m), Some(d)) => format!("{:04}-{:02}-{:02}", year, m, d),
            (Some(m), None) => format!("{:04}-{:02}", year, m),
            (None, Some(d)) => format!("{:04}-??-{:02}", year, d),
            (None, None) => format!("{:04}", year),
        };
        let malformed = |reason: String| PopoloError::MalformedDate {
            input: rendered.clone(),
            reason,
        };
        if !(0..=MAX_YEAR).contains(&year) {
            return Err(malformed(format!("year {} is outside 0000-{}", year, MAX_YEAR)));
        }
        match (month, day) {
            (None, Some(_)) => Err(malformed("a day requires a month".to_string())),
            (None, None) => {
                let first = NaiveDate::from_ymd_opt(year, 1, 1)
                    .ok_or_else(|| malformed("year out of range".to_string()))?;
                let last = NaiveDate::from_ymd_opt(year, 12, 31)
                    .ok_or_else(|| malformed("year out of range".to_string()))?;
                Ok(PartialDate { first, last, precision: Precision::Year })
            }
            (Some(m), None) => {
                if !(1..=12).contains(&m) {
                    return Err(malformed(format!("month {} is outside 1-12", m)));
                }
                let first = NaiveDate::from_ymd_opt(year, m, 1)
                    .ok_or_else(|| malformed("month out of range".to_string()))?;
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .ok_or_else(|| malformed("month out of range".to_string()))?;
                Ok(PartialDate { first, last, precision: Precision::Month })
            }
            (Some(m), Some(d)) => {
                if !(1..=12).contains(&m) {
                    return Err(malformed(format!("month {} is outside 1-12", m)));
                }
                let date = NaiveDate::from_ymd_opt(year, m, d).ok_or_else(|| {
                    malformed(format!("day {} does not exist in {:04}-{:02}", d, year, m))
                })?;
                Ok(PartialDate::from(date))
            }
        }
    }
    /// Parses an optional textual date, where both `None` and a blank string
    /// stand for an unknown date.
    pub fn parse_optional(s: Option<&str>) -> Result<Option<PartialDate>> {
        match s.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
    pub fn precision(&self) -> Precision {
        self.precision
    }
    pub fn year(&self) -> i32 {
        self.first.year()
    }
    pub fn month(&self) -> Option<u32> {
        match self.precision {
            Precision::Year => None,
            _ => Some(self.first.month()),
        }
    }
    pub fn day(&self) -> Option<u32> {
        match self.precision {
            Precision::Day => Some(self.first.day()),
            _ => None,
        }
    }
    /// First day of the span covered by this date.
    pub fn first_day(&self) -> NaiveDate {
        self.first
    }
    /// Last day of the span covered by this date.
    pub fn last_day(&self) -> NaiveDate {
        self.last
    }
    pub fn is_complete(&self) -> bool {
        self.precision == Precision::Day
    }
    /// Span based comparison, see [`DateRelation`].
    pub fn relate(&self, other: &PartialDate) -> DateRelation {
        if self == other {
            DateRelation::Equal
        } else if self.last < other.first {
            DateRelation::Less
        } else if self.first > other.last {
            DateRelation::Greater
        } else {
            DateRelation::Incomparable
        }
    }
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.first <= day && day <= self.last
    }
    /// Number of days from the first day of this date to the first day of `other`.
    pub fn days_until(&self, other: &PartialDate) -> i64 {
        (other.first - self.first).num_days()
    }
    /// A complete date `days` after the first day of this one.
    pub fn plus_days(&self, days: i64) -> Result<PartialDate> {
        let moved = if days >= 0 {
            self.first.checked_add_days(Days::new(days.unsigned_abs()))
        } else {
            self.first.checked_sub_days(Days::new(days.unsigned_abs()))
        };
        match moved {
            Some(date) if date.year() <= MAX_YEAR && date.year() >= 0 => Ok(PartialDate::from(date)),
            _ => Err(PopoloError::MalformedDate {
                input: format!("{} + {} days", self, days),
                reason: "result is outside 0000-9999".to_string(),
            }),
        }
    }
}

impl From<NaiveDate> for PartialDate {
    fn from(date: NaiveDate) -> Self {
        PartialDate { first: date, last: date, precision: Precision::Day }
    }
}
impl FromStr for PartialDate {
    type Err = PopoloError;
    fn from_str(s: &str) -> Result<PartialDate> {
        let captures = PARTIAL_DATE.captures(s).ok_or_else(|| PopoloError::MalformedDate {
            input: s.to_string(),
            reason: "expected YYYY, YYYY-MM or YYYY-MM-DD".to_string(),
        })?;
        // the regex only lets ascii digits through, so these cannot fail
        let component = |i: usize| captures.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = component(1).unwrap_or_default() as i32;
        PartialDate::from_parts(year, component(2), component(3)).map_err(|e| match e {
            PopoloError::MalformedDate { reason, .. } => PopoloError::MalformedDate {
                input: s.to_string(),
                reason,
            },
            other => other,
        })
    }
}
impl Ord for PartialDate {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.first, self.precision).cmp(&(other.first, other.precision))
    }
}
impl PartialOrd for PartialDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl ops::Sub for PartialDate {
    type Output = Duration;
    fn sub(self, other: PartialDate) -> Duration {
        self.first - other.first
    }
}
impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.precision {
            Precision::Year => write!(f, "{:04}", self.first.year()),
            Precision::Month => write!(f, "{:04}-{:02}", self.first.year(), self.first.month()),
            Precision::Day => write!(
                f,
                "{:04}-{:02}-{:02}",
                self.first.year(),
                self.first.month(),
                self.first.day()
            ),
        }
    }
}
impl Serialize for PartialDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> Deserialize<'de> for PartialDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
impl ToSql for PartialDate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}
impl FromSql for PartialDate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: PopoloError| FromSqlError::Other(Box::new(e)))
    }
}

/// Share of an organization held by an owner, between 0 and 100.
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Percentage(BigDecimal);

impl Percentage {
    pub fn new(value: BigDecimal) -> Result<Percentage> {
        if value < BigDecimal::from(0) || value > BigDecimal::from(100) {
            return Err(PopoloError::InvalidPercentage(value.to_string()));
        }
        Ok(Percentage(value.normalized()))
    }
    pub fn zero() -> Percentage {
        Percentage(BigDecimal::from(0))
    }
}
impl FromStr for Percentage {
    type Err = PopoloError;
    fn from_str(s: &str) -> Result<Percentage> {
        let value = BigDecimal::from_str(s.trim())
            .map_err(|_| PopoloError::InvalidPercentage(s.to_string()))?;
        Percentage::new(value)
    }
}
impl Default for Percentage {
    fn default() -> Self {
        Percentage::zero()
    }
}
impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Percentage {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl Serialize for Percentage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> Deserialize<'de> for Percentage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
