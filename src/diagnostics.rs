//! Data-quality reporting: per-column profiles of raw tables and the
//! markdown quality report written after each run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::dates::DateNormalizer;
use crate::merger::{JoinReconciliation, MergeOutcome};
use crate::models::{Builder, YearMonth};
use crate::normalize::SourceReport;
use crate::table::{format_metric, parse_number, Table};

/// Columns with fewer distinct values than this are treated as categorical.
pub const CATEGORICAL_THRESHOLD: usize = 30;
const DATE_SAMPLE_SIZE: usize = 20;
const SAMPLE_VALUES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numerical,
    Date,
    Categorical,
    Text,
}

impl ColumnKind {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnKind::Numerical => "numerical",
            ColumnKind::Date => "date",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnStats {
    Numerical {
        min: f64,
        max: f64,
        mean: f64,
        median: f64,
    },
    Date {
        earliest: Option<NaiveDate>,
        latest: Option<NaiveDate>,
        unparseable: usize,
    },
    Categorical {
        most_common: Vec<(String, usize)>,
        rarest: Vec<(String, usize)>,
    },
    Text {
        average_length: f64,
    },
}

#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
    pub missing_pct: f64,
    pub unique: usize,
    pub stats: ColumnStats,
    pub samples: Vec<String>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableProfile {
    pub name: String,
    pub rows: usize,
    pub malformed_rows: usize,
    pub columns: Vec<ColumnProfile>,
}

pub fn profile_table(table: &Table, dates: &DateNormalizer) -> TableProfile {
    let columns = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<&str> = table.column_values(idx).map(str::trim).collect();
            profile_column(name, &values, dates)
        })
        .collect();
    TableProfile {
        name: table.name.clone(),
        rows: table.len(),
        malformed_rows: table.malformed_rows,
        columns,
    }
}

fn classify(present: &[&str], dates: &DateNormalizer) -> ColumnKind {
    if present.is_empty() {
        return ColumnKind::Text;
    }
    // Majority vote so a few stray cells surface as issues instead of
    // changing the column's kind.
    let numeric = present
        .iter()
        .filter(|v| matches!(parse_number(v), Ok(Some(_))))
        .count();
    if numeric * 2 > present.len() {
        return ColumnKind::Numerical;
    }
    let sample: Vec<&&str> = present.iter().take(DATE_SAMPLE_SIZE).collect();
    let parsed = sample.iter().filter(|v| dates.parse(v).is_some()).count();
    if parsed * 2 > sample.len() {
        return ColumnKind::Date;
    }
    let unique: HashSet<&str> = present.iter().copied().collect();
    if unique.len() < CATEGORICAL_THRESHOLD {
        ColumnKind::Categorical
    } else {
        ColumnKind::Text
    }
}

fn profile_column(name: &str, values: &[&str], dates: &DateNormalizer) -> ColumnProfile {
    let present: Vec<&str> = values.iter().copied().filter(|v| !v.is_empty()).collect();
    let missing = values.len() - present.len();
    let missing_pct = if values.is_empty() {
        0.0
    } else {
        missing as f64 * 100.0 / values.len() as f64
    };
    let unique = present.iter().copied().collect::<HashSet<_>>().len();
    let kind = classify(&present, dates);
    let mut issues = Vec::new();

    let stats = match kind {
        ColumnKind::Numerical => {
            let mut numbers = Vec::new();
            let mut bad = Vec::new();
            for v in &present {
                match parse_number(v) {
                    Ok(Some(n)) => numbers.push(n),
                    _ => {
                        if !bad.contains(v) {
                            bad.push(*v);
                        }
                    }
                }
            }
            if !bad.is_empty() {
                let shown: Vec<&str> = bad.iter().take(3).copied().collect();
                issues.push(format!("Non-numeric values found: {}", shown.join(", ")));
            }
            numbers.sort_by(|a, b| a.total_cmp(b));
            let count = numbers.len().max(1) as f64;
            let median = match numbers.len() {
                0 => 0.0,
                n if n % 2 == 1 => numbers[n / 2],
                n => (numbers[n / 2 - 1] + numbers[n / 2]) / 2.0,
            };
            ColumnStats::Numerical {
                min: numbers.first().copied().unwrap_or(0.0),
                max: numbers.last().copied().unwrap_or(0.0),
                mean: numbers.iter().sum::<f64>() / count,
                median,
            }
        }
        ColumnKind::Date => {
            let parsed: Vec<Option<NaiveDate>> = present.iter().map(|v| dates.parse(v)).collect();
            let unparseable = parsed.iter().filter(|d| d.is_none()).count();
            if unparseable > 0 {
                issues.push(format!("{} unparseable date(s)", unparseable));
            }
            ColumnStats::Date {
                earliest: parsed.iter().flatten().min().copied(),
                latest: parsed.iter().flatten().max().copied(),
                unparseable,
            }
        }
        ColumnKind::Categorical => {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for v in &present {
                *counts.entry(*v).or_insert(0) += 1;
            }
            let mut ranked: Vec<(String, usize)> = counts
                .into_iter()
                .map(|(v, c)| (v.to_string(), c))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let most_common = ranked.iter().take(SAMPLE_VALUES).cloned().collect();
            let rarest = ranked.iter().rev().take(SAMPLE_VALUES).cloned().collect();
            ColumnStats::Categorical {
                most_common,
                rarest,
            }
        }
        ColumnKind::Text => {
            let total: usize = values.iter().map(|v| v.chars().count()).sum();
            ColumnStats::Text {
                average_length: total as f64 / values.len().max(1) as f64,
            }
        }
    };

    ColumnProfile {
        name: name.to_string(),
        kind,
        missing,
        missing_pct,
        unique,
        stats,
        samples: present.iter().take(SAMPLE_VALUES).map(|v| v.to_string()).collect(),
        issues,
    }
}

pub fn render_profile(profile: &TableProfile) -> String {
    profile.to_string()
}

impl fmt::Display for TableProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profile = self;
        writeln!(f, "# Data Exploration Report\n")?;
        writeln!(f, "**File:** `{}`\n", profile.name)?;
        writeln!(f, "## Basic Statistics\n")?;
        writeln!(f, "- **Rows:** {}", profile.rows)?;
        writeln!(f, "- **Columns:** {}", profile.columns.len())?;
        if profile.malformed_rows > 0 {
            writeln!(f, "- **Malformed lines skipped:** {}", profile.malformed_rows)?;
        }
        writeln!(f, "\n## Column Summary\n")?;
        writeln!(f, "| Column | Type | Missing | Unique |")?;
        writeln!(f, "|--------|------|---------|--------|")?;
        for col in &profile.columns {
            writeln!(
                f,
                "| {} | {} | {} ({:.1}%) | {} |",
                col.name,
                col.kind.label(),
                col.missing,
                col.missing_pct,
                col.unique
            )?;
        }
        writeln!(f, "\n## Detailed Column Analysis\n")?;
        for col in &profile.columns {
            writeln!(f, "### {}\n", col.name)?;
            writeln!(f, "**Type:** {}\n", col.kind.label())?;
            writeln!(
                f,
                "**Missing Values:** {} ({:.1}%)\n",
                col.missing, col.missing_pct
            )?;
            match &col.stats {
                ColumnStats::Numerical {
                    min,
                    max,
                    mean,
                    median,
                } => {
                    writeln!(f, "**Statistics:**")?;
                    writeln!(f, "- Min: {:.2}", min)?;
                    writeln!(f, "- Max: {:.2}", max)?;
                    writeln!(f, "- Mean: {:.2}", mean)?;
                    writeln!(f, "- Median: {:.2}", median)?;
                }
                ColumnStats::Date {
                    earliest,
                    latest,
                    unparseable,
                } => match (earliest, latest) {
                    (Some(first), Some(last)) => {
                        writeln!(f, "**Date Range:**")?;
                        writeln!(f, "- Earliest: `{}`", first)?;
                        writeln!(f, "- Latest: `{}`", last)?;
                        if *unparseable > 0 {
                            writeln!(f, "- Unparseable dates: {}", unparseable)?;
                        }
                    }
                    _ => {
                        writeln!(f, "**No valid dates found**")?;
                    }
                },
                ColumnStats::Categorical {
                    most_common,
                    rarest,
                } => {
                    writeln!(f, "**Most Common:**")?;
                    for (value, count) in most_common {
                        writeln!(f, "- `{}`: {}", value, count)?;
                    }
                    writeln!(f, "\n**Rarest:**")?;
                    for (value, count) in rarest {
                        writeln!(f, "- `{}`: {}", value, count)?;
                    }
                }
                ColumnStats::Text { average_length } => {
                    writeln!(f, "**Average Length:** {:.1} characters", average_length)?;
                }
            }
            if !matches!(col.stats, ColumnStats::Categorical { .. }) && !col.samples.is_empty() {
                writeln!(f, "\n**Sample Values:**")?;
                for value in &col.samples {
                    let shown: String = value.chars().take(50).collect();
                    let ellipsis = if value.chars().count() > 50 { "..." } else { "" };
                    writeln!(f, "- `{}{}`", shown, ellipsis)?;
                }
            }
            if !col.issues.is_empty() {
                writeln!(f, "\n**Data Quality Issues:**")?;
                for issue in &col.issues {
                    writeln!(f, "- {}", issue)?;
                }
            }
            writeln!(f, "\n---\n")?;
        }
        Ok(())
    }
}

fn variation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)phase|\bph\b|[0-9]|[\s\-_.]").expect("variation pattern is valid")
    })
}

/// Collapses the noise that usually separates spellings of the same
/// community: spacing, dashes, phase markers and digits.
pub fn variation_key(name: &str) -> String {
    variation_pattern()
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

/// Groups of distinct names that collapse to the same variation key.
pub fn find_variations<'a, I>(names: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        let group = groups.entry(variation_key(name)).or_default();
        if !group.iter().any(|n| n == name) {
            group.push(name.to_string());
        }
    }
    groups
        .into_values()
        .filter(|group| group.len() > 1)
        .collect()
}

/// Sales rows kept for one builder against what the unified report carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesCheck {
    pub builder: Builder,
    pub sales_rows: usize,
    pub reported_sales: f64,
    pub aggregated_revenue: f64,
    pub reported_revenue: f64,
}

impl SalesCheck {
    pub fn is_consistent(&self) -> bool {
        self.reported_sales == self.sales_rows as f64
            && (self.reported_revenue - self.aggregated_revenue).abs() < 0.005
    }
}

/// Month span of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCoverage {
    pub source: String,
    pub first: YearMonth,
    pub last: YearMonth,
}

/// Everything a finished run has to say about data quality.
#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    pub sources: Vec<SourceReport>,
    pub conservation: Vec<(String, bool)>,
    pub reconciliation: Vec<JoinReconciliation>,
    pub unmatched_columns: Vec<String>,
    pub sales_checks: Vec<SalesCheck>,
}

impl QualityReport {
    pub fn record_merge(&mut self, outcome: &MergeOutcome) {
        self.reconciliation.extend(outcome.reconciliation.iter().cloned());
        for column in &outcome.unmatched_columns {
            if !self.unmatched_columns.contains(column) {
                self.unmatched_columns.push(column.clone());
            }
        }
    }

    /// Month span of every source that kept rows, per builder.
    pub fn coverage(&self) -> BTreeMap<Builder, Vec<SourceCoverage>> {
        let mut by_builder: BTreeMap<Builder, Vec<SourceCoverage>> = BTreeMap::new();
        for s in &self.sources {
            if let Some((first, last)) = s.coverage {
                by_builder.entry(s.builder).or_default().push(SourceCoverage {
                    source: s.source.clone(),
                    first,
                    last,
                });
            }
        }
        by_builder
    }

    /// Builders whose sources do not all span the same months.
    pub fn coverage_gaps(&self) -> Vec<Builder> {
        self.coverage()
            .into_iter()
            .filter(|(_, spans)| {
                spans
                    .iter()
                    .any(|c| c.first != spans[0].first || c.last != spans[0].last)
            })
            .map(|(builder, _)| builder)
            .collect()
    }

    pub fn issue_count(&self) -> usize {
        let row_issues: usize = self
            .sources
            .iter()
            .map(|s| {
                s.date_failures.count
                    + s.communities.unmatched.len()
                    + s.non_numeric.values().map(|n| n.count).sum::<usize>()
                    + usize::from(!s.is_balanced())
            })
            .sum();
        row_issues
            + self.conservation.iter().filter(|(_, ok)| !ok).count()
            + self.reconciliation.iter().filter(|r| !r.is_complete()).count()
            + self.unmatched_columns.len()
            + self.coverage_gaps().len()
            + self.sales_checks.iter().filter(|c| !c.is_consistent()).count()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Data Quality Report\n")?;

        writeln!(f, "## Sources\n")?;
        writeln!(
            f,
            "| Source | Loaded | Malformed | Kept | Missing date | Bad date | Missing community | Unmatched | Excluded |"
        )?;
        writeln!(
            f,
            "|--------|--------|-----------|------|--------------|----------|-------------------|-----------|----------|"
        )?;
        for s in &self.sources {
            writeln!(
                f,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                s.label(),
                s.rows_loaded,
                s.malformed_rows,
                s.rows_normalized,
                s.missing_dates,
                s.date_failures.count,
                s.communities.missing,
                s.communities.unmatched_rows(),
                s.communities.excluded_rows()
            )?;
        }

        for s in &self.sources {
            let has_detail = !s.date_failures.is_empty()
                || !s.communities.unmatched.is_empty()
                || !s.non_numeric.is_empty()
                || !s.communities.excluded.is_empty();
            if !has_detail {
                continue;
            }
            writeln!(f, "\n### {}\n", s.label())?;
            if !s.date_failures.is_empty() {
                writeln!(
                    f,
                    "**Unparseable dates:** {} (e.g. {})",
                    s.date_failures.count,
                    s.date_failures.samples.join(", ")
                )?;
            }
            if !s.communities.unmatched.is_empty() {
                writeln!(f, "\n**Unmatched community names:**")?;
                for (name, count) in &s.communities.unmatched {
                    writeln!(f, "- {} ({} rows)", name, count)?;
                }
                let variations = find_variations(s.communities.unmatched.keys().map(String::as_str));
                for group in variations {
                    writeln!(f, "- possible variations: {}", group.join(" / "))?;
                }
            }
            if !s.communities.excluded.is_empty() {
                writeln!(f, "\n**Excluded communities:**")?;
                for (name, count) in &s.communities.excluded {
                    writeln!(f, "- {} ({} rows)", name, count)?;
                }
            }
            for (column, issue) in &s.non_numeric {
                writeln!(
                    f,
                    "\n**Non-numeric values in `{}`:** {} (e.g. {})",
                    column,
                    issue.count,
                    issue.samples.join(", ")
                )?;
            }
        }

        let coverage = self.coverage();
        if !coverage.is_empty() {
            let gaps = self.coverage_gaps();
            writeln!(f, "\n## Date Coverage")?;
            for (builder, spans) in &coverage {
                writeln!(f, "\n### Builder {}\n", builder)?;
                writeln!(f, "| Source | First month | Last month |")?;
                writeln!(f, "|--------|-------------|------------|")?;
                for c in spans {
                    writeln!(f, "| {} | {} | {} |", c.source, c.first, c.last)?;
                }
                let first = spans.iter().map(|c| c.first).min();
                let last = spans.iter().map(|c| c.last).max();
                if let (Some(first), Some(last)) = (first, last) {
                    writeln!(f, "\n- Overall: {} to {}", first, last)?;
                }
                if gaps.contains(builder) {
                    writeln!(
                        f,
                        "- Sources cover different month ranges; months outside the sales and target range are dropped by the join"
                    )?;
                }
            }
        }

        if !self.sales_checks.is_empty() {
            writeln!(f, "\n## Sales Totals\n")?;
            writeln!(f, "| Builder | Sales rows | Reported sales | Revenue | Reported revenue | Status |")?;
            writeln!(f, "|---------|------------|----------------|---------|------------------|--------|")?;
            for c in &self.sales_checks {
                writeln!(
                    f,
                    "| {} | {} | {} | {} | {} | {} |",
                    c.builder,
                    c.sales_rows,
                    format_metric(c.reported_sales),
                    format_metric(c.aggregated_revenue),
                    format_metric(c.reported_revenue),
                    if c.is_consistent() { "OK" } else { "MISMATCH" }
                )?;
            }
        }

        if !self.conservation.is_empty() {
            writeln!(f, "\n## Aggregation Conservation\n")?;
            for (label, ok) in &self.conservation {
                let verdict = if *ok { "OK" } else { "MISMATCH" };
                writeln!(f, "- {}: {}", label, verdict)?;
            }
        }

        if !self.reconciliation.is_empty() {
            writeln!(f, "\n## Join Reconciliation\n")?;
            writeln!(f, "| Source | Months | Matched | Dropped |")?;
            writeln!(f, "|--------|--------|---------|---------|")?;
            for r in &self.reconciliation {
                writeln!(
                    f,
                    "| {} {} | {} | {} | {} |",
                    r.source,
                    r.builder,
                    r.aggregate_rows,
                    r.matched_rows,
                    r.dropped.len()
                )?;
            }
            for r in self.reconciliation.iter().filter(|r| !r.is_complete()) {
                writeln!(f, "\n**{} {} months outside the base:**", r.source, r.builder)?;
                for (key, values) in &r.dropped {
                    let shown: Vec<String> = r
                        .columns
                        .iter()
                        .zip(values)
                        .map(|(c, v)| format!("{}={}", c, format_metric(*v)))
                        .collect();
                    writeln!(f, "- {}: {}", key, shown.join(", "))?;
                }
            }
        }

        if !self.unmatched_columns.is_empty() {
            writeln!(f, "\n## Columns With No Matches\n")?;
            for column in &self.unmatched_columns {
                writeln!(f, "- {}", column)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Builder;

    fn sales() -> Table {
        Table::from_strs(
            "sales.csv",
            &["home_id", "sale_contract_date", "community_name", "total_sale_price"],
            &[
                &["1", "2025-01-05", "Cedar Creek", "400000"],
                &["2", "03/12/2025", "Cedar Creek Ph 1", "410000"],
                &["3", "not a date", "Fairview", "TBD"],
                &["4", "2025-02-11", "", "395000"],
            ],
        )
    }

    #[test]
    fn columns_are_classified_by_majority() {
        let profile = profile_table(&sales(), &DateNormalizer::default());
        let kinds: Vec<ColumnKind> = profile.columns.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Numerical,
                ColumnKind::Date,
                ColumnKind::Categorical,
                ColumnKind::Numerical,
            ]
        );
        let price = &profile.columns[3];
        assert_eq!(price.issues, vec!["Non-numeric values found: TBD"]);
        let community = &profile.columns[2];
        assert_eq!(community.missing, 1);
        assert!((community.missing_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn date_columns_report_range_and_failures() {
        let profile = profile_table(&sales(), &DateNormalizer::default());
        match &profile.columns[1].stats {
            ColumnStats::Date {
                earliest,
                latest,
                unparseable,
            } => {
                assert_eq!(*earliest, NaiveDate::from_ymd_opt(2025, 1, 5));
                assert_eq!(*latest, NaiveDate::from_ymd_opt(2025, 3, 12));
                assert_eq!(*unparseable, 1);
            }
            other => panic!("expected date stats, got {other:?}"),
        }
        let markdown = render_profile(&profile);
        assert!(markdown.contains("| sale_contract_date | date | 0 (0.0%) | 4 |"));
        assert!(markdown.contains("- Earliest: `2025-01-05`"));
    }

    #[test]
    fn variations_ignore_spacing_phases_and_digits() {
        assert_eq!(variation_key("Cedar Creek - Phase 2"), "cedarcreek");
        assert_eq!(variation_key("CedarCreek Ph 1"), "cedarcreek");
        let groups = find_variations(["Cedar Creek Ph 1", "cedar-creek", "Fairview", "Cedar Creek Ph 1"]);
        assert_eq!(groups, vec![vec!["Cedar Creek Ph 1".to_string(), "cedar-creek".to_string()]]);
    }

    #[test]
    fn quality_report_lists_unmatched_names() {
        let mut source = SourceReport::new("crm", Builder::A);
        source.rows_loaded = 3;
        source.rows_normalized = 2;
        source.date_failures.record("soon");
        source.communities.record_unmatched("crm A", "Mystery Hollow");
        let report = QualityReport {
            sources: vec![source],
            ..QualityReport::default()
        };
        let text = report.render();
        assert!(text.contains("| crm A | 3 | 0 | 2 | 0 | 1 | 0 | 1 | 0 |"));
        assert!(text.contains("- Mystery Hollow (1 rows)"));
        assert!(text.contains("**Unparseable dates:** 1 (e.g. soon)"));
        assert_eq!(report.issue_count(), 2);
    }

    fn spanning(source: &str, first: (i32, u32), last: (i32, u32)) -> SourceReport {
        let mut report = SourceReport::new(source, Builder::A);
        report.record_month(YearMonth::new(first.0, first.1));
        report.record_month(YearMonth::new(last.0, last.1));
        report
    }

    #[test]
    fn coverage_flags_sources_running_past_sales() {
        let report = QualityReport {
            sources: vec![
                spanning("sales", (2025, 1), (2025, 2)),
                spanning("targets", (2025, 1), (2025, 2)),
                spanning("traffic", (2024, 12), (2025, 3)),
                SourceReport::new("crm", Builder::B),
            ],
            ..QualityReport::default()
        };
        assert_eq!(report.coverage_gaps(), vec![Builder::A]);
        assert_eq!(report.coverage()[&Builder::A].len(), 3);
        assert!(!report.coverage().contains_key(&Builder::B));

        let text = report.render();
        assert!(text.contains("### Builder A"));
        assert!(text.contains("| traffic | 2024-12 | 2025-03 |"));
        assert!(text.contains("- Overall: 2024-12 to 2025-03"));
        assert!(text.contains("Sources cover different month ranges"));
        assert_eq!(report.issue_count(), 1);
    }

    #[test]
    fn sales_totals_compare_rows_with_the_report() {
        let check = SalesCheck {
            builder: Builder::A,
            sales_rows: 3,
            reported_sales: 3.0,
            aggregated_revenue: 1_160_000.0,
            reported_revenue: 1_160_000.0,
        };
        let lost = SalesCheck {
            reported_sales: 2.0,
            ..check.clone()
        };
        assert!(check.is_consistent());
        assert!(!lost.is_consistent());
        let report = QualityReport {
            sales_checks: vec![check, lost],
            ..QualityReport::default()
        };
        assert!(report.render().contains("| A | 3 | 3 | 1160000 | 1160000 | OK |"));
        assert_eq!(report.issue_count(), 1);
    }
}
