//! Range queries.
//!
//! Grammar: `key in range [<min> to <max>]`. Bounds are numeric, or dates
//! in one of three supported formats; dates are normalized to days since
//! the Unix epoch before comparison. A range query is equivalent to the
//! condition pair `key >= min AND key <= max`.

use chrono::NaiveDate;
use regex::Regex;

use super::QueryParseError;
use super::condition::{Condition, ConditionOp, LogicalOp, MultiConditionQuery, parse_numeric};
use crate::index::pattern::AffixPattern;

/// Supported date layouts for range bounds and candidate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `YYYY-MM-DD` (default)
    YearMonthDay,
    /// `MM/DD/YYYY`
    MonthDayYear,
    /// `DD-MM-YYYY`
    DayMonthYear,
}

impl DateFormat {
    fn chrono_pattern(self) -> &'static str {
        match self {
            DateFormat::YearMonthDay => "%Y-%m-%d",
            DateFormat::MonthDayYear => "%m/%d/%Y",
            DateFormat::DayMonthYear => "%d-%m-%Y",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DateFormat::YearMonthDay => "YYYY-MM-DD",
            DateFormat::MonthDayYear => "MM/DD/YYYY",
            DateFormat::DayMonthYear => "DD-MM-YYYY",
        }
    }

    /// Picks the layout a date literal is written in. Ten-character
    /// strings only; anything else is not a date.
    fn detect(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 10 {
            return None;
        }
        if bytes[2] == b'/' && bytes[5] == b'/' {
            return Some(DateFormat::MonthDayYear);
        }
        if bytes[4] == b'-' && bytes[7] == b'-' {
            return Some(DateFormat::YearMonthDay);
        }
        if bytes[2] == b'-' && bytes[5] == b'-' {
            return Some(DateFormat::DayMonthYear);
        }
        None
    }
}

fn date_to_days(date_str: &str, format: DateFormat) -> Result<f64, QueryParseError> {
    let date = NaiveDate::parse_from_str(date_str, format.chrono_pattern()).map_err(|_| {
        QueryParseError::InvalidDate(date_str.to_string(), format.name().to_string())
    })?;
    // NaiveDate::default() is the Unix epoch.
    Ok(date.signed_duration_since(NaiveDate::default()).num_days() as f64)
}

fn days_to_date(days: f64, format: DateFormat) -> String {
    let date = NaiveDate::default() + chrono::Duration::days(days as i64);
    date.format(format.chrono_pattern()).to_string()
}

/// A parsed range query over one key pattern.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    key: String,
    min_value: f64,
    max_value: f64,
    date_format: Option<DateFormat>,
}

impl RangeQuery {
    pub fn numeric(key: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            key: key.into(),
            min_value: min,
            max_value: max,
            date_format: None,
        }
    }

    pub fn dates(
        key: impl Into<String>,
        min_date: &str,
        max_date: &str,
        format: DateFormat,
    ) -> Result<Self, QueryParseError> {
        Ok(Self {
            key: key.into(),
            min_value: date_to_days(min_date, format)?,
            max_value: date_to_days(max_date, format)?,
            date_format: Some(format),
        })
    }

    pub fn looks_like(query: &str) -> bool {
        query.contains(" in range [")
    }

    /// Parses `key in range [min to max]`. Bounds that both parse as
    /// numbers make a numeric range; otherwise both must be dates in the
    /// same supported layout.
    pub fn parse(query: &str) -> Result<Self, QueryParseError> {
        // The regex is infallible for this literal pattern.
        let pattern = Regex::new(r"^(.+?)\s+in\s+range\s+\[(.+?)\s+to\s+(.+?)\]$")
            .map_err(|_| QueryParseError::InvalidRange(query.to_string()))?;

        let captures = pattern
            .captures(query.trim())
            .ok_or_else(|| QueryParseError::InvalidRange(query.to_string()))?;

        let key = captures[1].trim().to_string();
        let min_str = captures[2].trim();
        let max_str = captures[3].trim();

        if let (Some(min), Some(max)) = (parse_numeric(min_str), parse_numeric(max_str)) {
            return Ok(Self::numeric(key, min, max));
        }

        let format = DateFormat::detect(min_str)
            .ok_or_else(|| QueryParseError::InvalidRange(query.to_string()))?;
        Self::dates(key, min_str, max_str, format)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn is_date_range(&self) -> bool {
        self.date_format.is_some()
    }

    /// Whether one `(key, value)` record falls inside the range. Values
    /// that fail to parse as the expected kind never match.
    pub fn is_in_range(&self, record_key: &str, record_value: &str) -> bool {
        if !AffixPattern::parse(&self.key).matches(record_key) {
            return false;
        }

        let numeric = match self.date_format {
            Some(format) => match date_to_days(record_value, format) {
                Ok(days) => days,
                Err(_) => return false,
            },
            None => match parse_numeric(record_value) {
                Some(v) => v,
                None => return false,
            },
        };

        numeric >= self.min_value && numeric <= self.max_value
    }

    /// Lowers the range into its equivalent condition pair
    /// `key >= min AND key <= max`.
    pub fn to_multi_condition_query(&self) -> MultiConditionQuery {
        let bound = |v: f64| match self.date_format {
            Some(format) => days_to_date(v, format),
            None => format!("{}", v),
        };

        let mut query = MultiConditionQuery::new(Condition {
            key: self.key.clone(),
            op: ConditionOp::GreaterEqual,
            value: bound(self.min_value),
        });
        query.add_condition(
            LogicalOp::And,
            Condition {
                key: self.key.clone(),
                op: ConditionOp::LessEqual,
                value: bound(self.max_value),
            },
        );

        query
    }
}

impl std::fmt::Display for RangeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.date_format {
            Some(format) => write!(
                f,
                "{} in range [{} to {}]",
                self.key,
                days_to_date(self.min_value, format),
                days_to_date(self.max_value, format)
            ),
            None => write!(
                f,
                "{} in range [{} to {}]",
                self.key, self.min_value, self.max_value
            ),
        }
    }
}
