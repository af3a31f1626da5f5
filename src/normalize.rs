use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::{info, warn};

use crate::community::{Canonicalizer, CommunityReport, ExclusionList, Resolution, UnmatchedPolicy};
use crate::dates::{DateFailures, DateNormalizer};
use crate::error::{PipelineError, Result};
use crate::models::{Builder, MonthKey, YearMonth};
use crate::table::Table;

const MAX_NUMBER_SAMPLES: usize = 3;

/// Non-numeric cells found in a column that must be numeric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonNumeric {
    pub count: usize,
    pub samples: Vec<String>,
}

/// Everything that happened to one source table on its way to a monthly
/// aggregate. Every loaded row lands in exactly one bucket.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub builder: Builder,
    pub rows_loaded: usize,
    pub malformed_rows: usize,
    pub missing_dates: usize,
    pub date_failures: DateFailures,
    pub communities: CommunityReport,
    pub rows_normalized: usize,
    pub non_numeric: BTreeMap<String, NonNumeric>,
    /// First and last month among the kept rows.
    pub coverage: Option<(YearMonth, YearMonth)>,
}

impl SourceReport {
    pub fn new(source: impl Into<String>, builder: Builder) -> Self {
        Self {
            source: source.into(),
            builder,
            rows_loaded: 0,
            malformed_rows: 0,
            missing_dates: 0,
            date_failures: DateFailures::default(),
            communities: CommunityReport::default(),
            rows_normalized: 0,
            non_numeric: BTreeMap::new(),
            coverage: None,
        }
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.source, self.builder)
    }

    pub fn record_non_numeric(&mut self, column: &str, raw: &str) {
        let entry = self.non_numeric.entry(column.to_string()).or_default();
        entry.count += 1;
        if entry.samples.len() < MAX_NUMBER_SAMPLES && !entry.samples.iter().any(|s| s == raw) {
            entry.samples.push(raw.to_string());
        }
    }

    /// Widens the coverage to include `month`.
    pub fn record_month(&mut self, month: YearMonth) {
        self.coverage = Some(match self.coverage {
            Some((first, last)) => (first.min(month), last.max(month)),
            None => (month, month),
        });
    }

    /// Rows removed before aggregation, by reason.
    pub fn rows_dropped(&self) -> usize {
        self.missing_dates
            + self.date_failures.count
            + self.communities.missing
            + self.communities.unmatched_dropped
            + self.communities.excluded_rows()
    }

    /// True when every loaded row is either normalized or explicitly dropped.
    pub fn is_balanced(&self) -> bool {
        self.rows_normalized + self.rows_dropped() == self.rows_loaded
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub key: MonthKey,
    pub date: NaiveDate,
    pub fields: Vec<String>,
}

/// A source table whose rows all carry a resolved `(community, year, month)`.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub source: String,
    pub builder: Builder,
    pub headers: Vec<String>,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Which columns of a raw table carry the date and the community.
#[derive(Debug, Clone, Copy)]
pub struct KeyColumns<'a> {
    pub date: &'a [String],
    pub community: &'a [String],
}

/// Date and community resolution shared by every dated source.
#[derive(Debug, Clone)]
pub struct Normalizer {
    dates: DateNormalizer,
    communities: Canonicalizer,
    policy: UnmatchedPolicy,
}

impl Normalizer {
    pub fn new(dates: DateNormalizer, communities: Canonicalizer, policy: UnmatchedPolicy) -> Self {
        Self {
            dates,
            communities,
            policy,
        }
    }

    pub fn dates(&self) -> &DateNormalizer {
        &self.dates
    }

    pub fn communities(&self) -> &Canonicalizer {
        &self.communities
    }

    pub fn policy(&self) -> UnmatchedPolicy {
        self.policy
    }

    /// Resolves a raw community cell under the configured policy. Returns
    /// `None` when the row should not be kept.
    pub fn resolve_community(
        &self,
        table: &str,
        raw: &str,
        report: &mut CommunityReport,
    ) -> Option<String> {
        if raw.trim().is_empty() {
            report.missing += 1;
            return None;
        }
        match self.communities.resolve(raw) {
            Resolution::Canonical(name) => Some(name),
            Resolution::Unmatched(name) => {
                report.record_unmatched(table, &name);
                match self.policy {
                    UnmatchedPolicy::PassThrough | UnmatchedPolicy::Fail => Some(name),
                    UnmatchedPolicy::Drop => {
                        report.unmatched_dropped += 1;
                        None
                    }
                }
            }
        }
    }

    /// Resolves the date and community of every row, applies the exclusion
    /// list, and tags each surviving row with its month key.
    pub fn normalize(
        &self,
        table: &Table,
        source: &str,
        builder: Builder,
        columns: KeyColumns<'_>,
        exclusions: &ExclusionList,
    ) -> Result<(NormalizedTable, SourceReport)> {
        let date_idx = table.require_column(columns.date)?;
        let community_idx = table.require_column(columns.community)?;

        let mut report = SourceReport::new(source, builder);
        report.rows_loaded = table.len();
        report.malformed_rows = table.malformed_rows;
        let label = report.label();

        let mut rows = Vec::with_capacity(table.len());
        for row in &table.rows {
            let raw_date = &row[date_idx];
            if raw_date.trim().is_empty() {
                report.missing_dates += 1;
                continue;
            }
            let Some(date) = self.dates.normalize(raw_date, &mut report.date_failures) else {
                continue;
            };
            let Some(community) =
                self.resolve_community(&label, &row[community_idx], &mut report.communities)
            else {
                continue;
            };
            if exclusions.contains(&community) {
                report.communities.record_excluded(&community);
                continue;
            }
            report.record_month(YearMonth::new(date.year(), date.month()));
            rows.push(NormalizedRow {
                key: MonthKey::new(community, date.year(), date.month()),
                date,
                fields: row.clone(),
            });
        }
        report.rows_normalized = rows.len();

        if self.policy == UnmatchedPolicy::Fail && !report.communities.unmatched.is_empty() {
            return Err(PipelineError::UnmatchedCommunities {
                table: label,
                count: report.communities.unmatched_rows(),
                samples: report.communities.unmatched.keys().cloned().collect(),
            });
        }
        if !report.date_failures.is_empty() {
            warn!(
                "{}: {} unparseable date(s), e.g. {}",
                label,
                report.date_failures.count,
                report.date_failures.samples.join(", ")
            );
        }
        let excluded = report.communities.excluded_rows();
        if excluded > 0 {
            info!(
                "{}: dropped {} row(s) from excluded communities",
                label, excluded
            );
        }
        info!(
            "{}: {} of {} rows normalized",
            label, report.rows_normalized, report.rows_loaded
        );

        Ok((
            NormalizedTable {
                source: source.to_string(),
                builder,
                headers: table.headers.clone(),
                rows,
            },
            report,
        ))
    }
}
