use std::collections::BTreeMap;

use tracing::info;

use crate::aggregator::MonthlyAggregate;
use crate::community::{Canonicalizer, CommunityReport, ExclusionList};
use crate::error::Result;
use crate::models::{Builder, MonthKey, NormalizedKey, TargetColumns, YearMonth};
use crate::normalize::{Normalizer, SourceReport};
use crate::table::{parse_number, Table};

pub const TOTAL_SALES: &str = "total_sales";
pub const TOTAL_REVENUE: &str = "total_revenue";
pub const SALES_TARGET: &str = "sales_target";

pub const BASE_COLUMNS: [&str; 3] = [TOTAL_SALES, TOTAL_REVENUE, SALES_TARGET];

/// One community-month of the sales and target base.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseRow {
    pub builder: Builder,
    pub community: String,
    pub year: i32,
    pub month: u32,
    pub total_sales: f64,
    pub total_revenue: f64,
    pub sales_target: f64,
}

impl BaseRow {
    pub fn key(&self) -> NormalizedKey {
        NormalizedKey::new(
            self.builder,
            MonthKey::new(self.community.clone(), self.year, self.month),
        )
    }

    fn values(&self) -> [f64; 3] {
        [self.total_sales, self.total_revenue, self.sales_target]
    }
}

/// The authoritative set of report keys. Each key appears once; rows that
/// collide after canonicalization are summed.
#[derive(Debug, Clone, Default)]
pub struct BaseTable {
    rows: BTreeMap<NormalizedKey, [f64; 3]>,
}

impl BaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizes the community of each row before keying it. Names no
    /// rule maps are kept as-is and counted into `report`.
    pub fn from_rows<I>(rows: I, communities: &Canonicalizer, report: &mut CommunityReport) -> Self
    where
        I: IntoIterator<Item = BaseRow>,
    {
        let mut table = Self::new();
        for mut row in rows {
            let resolved = communities.resolve(&row.community);
            if !resolved.is_matched() {
                report.record_unmatched("base", resolved.name());
            }
            row.community = resolved.name().to_string();
            table.add(row.key(), row.values());
        }
        table
    }

    /// Outer union of one builder's monthly sales and its targets.
    pub fn from_sources(
        builder: Builder,
        sales: &MonthlyAggregate,
        targets: &BTreeMap<MonthKey, f64>,
    ) -> Self {
        let count_idx = sales.column(TOTAL_SALES);
        let revenue_idx = sales.column(TOTAL_REVENUE);
        let mut table = Self::new();
        for (key, values) in &sales.rows {
            let count = count_idx.map(|i| values[i]).unwrap_or(0.0);
            let revenue = revenue_idx.map(|i| values[i]).unwrap_or(0.0);
            table.add(NormalizedKey::new(builder, key.clone()), [count, revenue, 0.0]);
        }
        for (key, target) in targets {
            table.add(NormalizedKey::new(builder, key.clone()), [0.0, 0.0, *target]);
        }
        info!(
            "base {}: {} sales month(s), {} target month(s), {} combined",
            builder,
            sales.len(),
            targets.len(),
            table.len()
        );
        table
    }

    fn add(&mut self, key: NormalizedKey, values: [f64; 3]) {
        let slot = self.rows.entry(key).or_insert([0.0; 3]);
        for (acc, v) in slot.iter_mut().zip(values) {
            *acc += v;
        }
    }

    pub fn extend(&mut self, other: BaseTable) {
        for (key, values) in other.rows {
            self.add(key, values);
        }
    }

    /// Rows in report order: (year, month, builder, community).
    pub fn iter(&self) -> impl Iterator<Item = (&NormalizedKey, &[f64; 3])> {
        self.rows.iter()
    }

    pub fn contains(&self, key: &NormalizedKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total(&self, column: &str) -> f64 {
        match BASE_COLUMNS.iter().position(|c| *c == column) {
            Some(idx) => self.rows.values().map(|v| v[idx]).sum(),
            None => 0.0,
        }
    }
}

/// Reads a long-format target table (`community, year, month, target`) into
/// monthly targets. Rows with an unreadable year or month are skipped and
/// reported as non-numeric; rows of excluded communities are dropped.
pub fn load_targets(
    table: &Table,
    builder: Builder,
    columns: &TargetColumns,
    normalizer: &Normalizer,
    exclusions: &ExclusionList,
) -> Result<(BTreeMap<MonthKey, f64>, SourceReport)> {
    let community_idx = table.require_column(&columns.community)?;
    let year_idx = table.require_column(&columns.year)?;
    let month_idx = table.require_column(&columns.month)?;
    let target_idx = table.require_column(&columns.target)?;

    let mut report = SourceReport::new("targets", builder);
    report.rows_loaded = table.len();
    report.malformed_rows = table.malformed_rows;
    let label = report.label();

    let mut targets = BTreeMap::new();
    for row in &table.rows {
        let year = match parse_number(&row[year_idx]) {
            Ok(Some(y)) if y.fract() == 0.0 => y as i32,
            _ => {
                report.record_non_numeric(&table.headers[year_idx], row[year_idx].trim());
                report.missing_dates += 1;
                continue;
            }
        };
        let month = match parse_number(&row[month_idx]) {
            Ok(Some(m)) if m.fract() == 0.0 && (1.0..=12.0).contains(&m) => m as u32,
            _ => {
                report.record_non_numeric(&table.headers[month_idx], row[month_idx].trim());
                report.missing_dates += 1;
                continue;
            }
        };
        let Some(community) =
            normalizer.resolve_community(&label, &row[community_idx], &mut report.communities)
        else {
            continue;
        };
        if exclusions.contains(&community) {
            report.communities.record_excluded(&community);
            continue;
        }
        // A blank target means no target was set for that month.
        let target = match parse_number(&row[target_idx]) {
            Ok(value) => value.unwrap_or(0.0),
            Err(()) => {
                report.record_non_numeric(&table.headers[target_idx], row[target_idx].trim());
                0.0
            }
        };
        report.record_month(YearMonth::new(year, month));
        *targets
            .entry(MonthKey::new(community, year, month))
            .or_insert(0.0) += target;
        report.rows_normalized += 1;
    }
    info!(
        "{}: {} of {} rows read into {} target month(s)",
        label,
        report.rows_normalized,
        report.rows_loaded,
        targets.len()
    );
    Ok((targets, report))
}
