use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How ambiguous numeric dates such as `03/04/2025` or `03-04-2025` are
/// read. The order applies to both the slash and the dash formats, and to
/// two-digit years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// `03/04/2025` and `03-04-2025` are March 4th.
    #[default]
    MonthFirst,
    /// `03/04/2025` and `03-04-2025` are April 3rd.
    DayFirst,
}

const MONTH_FIRST_FORMATS: [&str; 6] = [
    "%Y-%m-%d", // 2025-03-12
    "%m/%d/%Y", // 03/12/2025
    "%d/%m/%Y", // 12/03/2025
    "%Y/%m/%d", // 2025/03/12
    "%m-%d-%Y", // 03-12-2025
    "%d-%m-%Y", // 12-03-2025
];

const DAY_FIRST_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y", "%m-%d-%Y",
];

const TEXTUAL_FORMATS: [&str; 5] = ["%b %d, %Y", "%b %d %Y", "%d %b %Y", "%d-%b-%Y", "%b-%d-%Y"];

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

const MAX_FAILURE_SAMPLES: usize = 5;

/// Parse failures collected while normalizing one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFailures {
    pub count: usize,
    pub samples: Vec<String>,
}

impl DateFailures {
    pub fn record(&mut self, raw: &str) {
        self.count += 1;
        if self.samples.len() < MAX_FAILURE_SAMPLES && !self.samples.iter().any(|s| s == raw) {
            self.samples.push(raw.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Parses free-form date cells against an ordered list of explicit formats,
/// then falls back to a permissive inference.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateNormalizer {
    order: DateOrder,
}

impl DateNormalizer {
    pub fn new(order: DateOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> DateOrder {
        self.order
    }

    fn explicit_formats(&self) -> &'static [&'static str] {
        match self.order {
            DateOrder::MonthFirst => &MONTH_FIRST_FORMATS,
            DateOrder::DayFirst => &DAY_FIRST_FORMATS,
        }
    }

    /// Returns `None` for blank input and for values no format accepts.
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        self.parse_explicit(value).or_else(|| self.infer(value))
    }

    /// Like `parse`, but records non-blank failures into `failures`.
    pub fn normalize(&self, raw: &str, failures: &mut DateFailures) -> Option<NaiveDate> {
        if raw.trim().is_empty() {
            return None;
        }
        let parsed = self.parse(raw);
        if parsed.is_none() {
            debug!("could not parse date: {}", raw.trim());
            failures.record(raw.trim());
        }
        parsed
    }

    fn parse_explicit(&self, value: &str) -> Option<NaiveDate> {
        // `%Y` also accepts short years; those belong to the `%y` fallback.
        self.explicit_formats().iter().find_map(|fmt| {
            NaiveDate::parse_from_str(value, fmt)
                .ok()
                .filter(|date| date.year() >= 1000)
        })
    }

    fn infer(&self, value: &str) -> Option<NaiveDate> {
        // Offset timestamps are converted to UTC before the date is taken.
        if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
            return Some(ts.with_timezone(&Utc).date_naive());
        }
        if let Some(ts) = TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        {
            return Some(ts.date());
        }
        if let Some(date) = TEXTUAL_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        {
            return Some(date);
        }
        let two_digit_year = match self.order {
            DateOrder::MonthFirst => ["%m/%d/%y", "%d/%m/%y"],
            DateOrder::DayFirst => ["%d/%m/%y", "%m/%d/%y"],
        };
        if let Some(date) = two_digit_year
            .iter()
            .find_map(|fmt| parse_two_digit_year(value, fmt))
        {
            return Some(date);
        }
        // `2025-01-15 10:30 AM` and similar: retry the leading date token.
        let head = value
            .split(|c: char| c == 'T' || c.is_whitespace())
            .next()
            .unwrap_or(value);
        if head.len() < value.len() {
            return self.parse_explicit(head);
        }
        None
    }
}

fn parse_two_digit_year(value: &str, fmt: &str) -> Option<NaiveDate> {
    // `%y` would otherwise accept the first two digits of a four-digit year.
    let year_part = value.rsplit('/').next()?;
    if year_part.len() != 2 {
        return None;
    }
    NaiveDate::parse_from_str(value, fmt).ok()
}
