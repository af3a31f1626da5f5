use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::{info, warn};

use crate::aggregator::MonthlyAggregate;
use crate::base::{BaseTable, BASE_COLUMNS};
use crate::error::Result;
use crate::models::{Builder, MonthKey, NormalizedKey};
use crate::table::{format_metric, write_csv};

pub const KEY_COLUMNS: [&str; 4] = ["builder", "community", "year", "month"];

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRow {
    pub key: NormalizedKey,
    pub values: Vec<f64>,
}

/// Base rows with every secondary source left-joined and zero-filled.
#[derive(Debug, Clone, Default)]
pub struct UnifiedReport {
    /// Metric columns, in output order, after the key columns.
    pub columns: Vec<String>,
    pub rows: Vec<UnifiedRow>,
}

impl UnifiedReport {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column(column)?;
        self.rows.get(row).map(|r| r.values[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> Vec<String> {
        KEY_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                let mut out = vec![
                    row.key.builder.to_string(),
                    row.key.community.clone(),
                    row.key.year.to_string(),
                    row.key.month.to_string(),
                ];
                out.extend(row.values.iter().map(|v| format_metric(*v)));
                out
            })
            .collect();
        write_csv(path, &self.headers(), &rows)
    }
}

/// How one aggregate fared against the base in the left join.
#[derive(Debug, Clone)]
pub struct JoinReconciliation {
    pub source: String,
    pub builder: Builder,
    pub aggregate_rows: usize,
    pub matched_rows: usize,
    /// Aggregate rows with no base key, with their metric values.
    pub dropped: Vec<(MonthKey, Vec<f64>)>,
    pub columns: Vec<String>,
}

impl JoinReconciliation {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }

    /// Sum of a column over the dropped rows.
    pub fn dropped_total(&self, column: &str) -> f64 {
        match self.columns.iter().position(|c| c == column) {
            Some(idx) => self.dropped.iter().map(|(_, v)| v[idx]).sum(),
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub report: UnifiedReport,
    pub reconciliation: Vec<JoinReconciliation>,
    /// Joined columns that received no value for any base row.
    pub unmatched_columns: Vec<String>,
}

/// Left-joins each aggregate onto the base on (builder, community, year,
/// month), in order. Keys only a secondary source knows are dropped and
/// reported; missing contributions become zero.
pub fn merge(base: &BaseTable, aggregates: &[MonthlyAggregate]) -> MergeOutcome {
    merge_with_schema(base, &[], aggregates)
}

/// Like [`merge`], but `schema` columns follow the base columns even when no
/// aggregate provides them, so a missing source still shows up as zeros.
pub fn merge_with_schema(
    base: &BaseTable,
    schema: &[&str],
    aggregates: &[MonthlyAggregate],
) -> MergeOutcome {
    let mut columns: Vec<String> = BASE_COLUMNS
        .iter()
        .chain(schema)
        .map(|c| c.to_string())
        .collect();
    // Output slot of each aggregate column; same-named columns share a slot.
    // Metric columns of every source come first, pivot columns after them.
    let mut slots: Vec<Vec<usize>> = aggregates
        .iter()
        .map(|a| Vec::with_capacity(a.columns.len()))
        .collect();
    for pivots in [false, true] {
        for (aggregate, targets) in aggregates.iter().zip(slots.iter_mut()) {
            let range = if pivots {
                aggregate.metric_columns..aggregate.columns.len()
            } else {
                0..aggregate.metric_columns
            };
            for column in &aggregate.columns[range] {
                match columns.iter().position(|c| c == column) {
                    Some(idx) => targets.push(idx),
                    None => {
                        columns.push(column.clone());
                        targets.push(columns.len() - 1);
                    }
                }
            }
        }
    }

    // BTreeMap iteration already yields report order.
    let mut cells: BTreeMap<NormalizedKey, Vec<Option<f64>>> = base
        .iter()
        .map(|(key, values)| {
            let mut row: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
            row.resize(columns.len(), None);
            (key.clone(), row)
        })
        .collect();

    let mut reconciliation = Vec::with_capacity(aggregates.len());
    for (aggregate, targets) in aggregates.iter().zip(&slots) {
        let mut matched_rows = 0;
        let mut dropped = Vec::new();
        for (month_key, values) in &aggregate.rows {
            let key = NormalizedKey::new(aggregate.builder, month_key.clone());
            match cells.get_mut(&key) {
                Some(row) => {
                    matched_rows += 1;
                    for (&target, value) in targets.iter().zip(values) {
                        *row[target].get_or_insert(0.0) += value;
                    }
                }
                None => dropped.push((month_key.clone(), values.clone())),
            }
        }
        if !dropped.is_empty() {
            warn!(
                "{} {}: {} of {} community-month(s) have no base row and were dropped",
                aggregate.source,
                aggregate.builder,
                dropped.len(),
                aggregate.len()
            );
        }
        info!(
            "joined {} {}: {} of {} community-month(s) matched",
            aggregate.source,
            aggregate.builder,
            matched_rows,
            aggregate.len()
        );
        reconciliation.push(JoinReconciliation {
            source: aggregate.source.clone(),
            builder: aggregate.builder,
            aggregate_rows: aggregate.len(),
            matched_rows,
            dropped,
            columns: aggregate.columns.clone(),
        });
    }

    // Only columns some aggregate feeds can fail to match.
    let fed: HashSet<usize> = slots.iter().flatten().copied().collect();
    let unmatched_columns: Vec<String> = columns
        .iter()
        .enumerate()
        .filter(|(idx, _)| fed.contains(idx))
        .filter(|(idx, _)| cells.values().all(|row| row[*idx].is_none()))
        .map(|(_, name)| name.clone())
        .collect();
    if !base.is_empty() {
        for column in &unmatched_columns {
            warn!("column '{}' matched no base row; it is all zeros", column);
        }
    }

    let rows = cells
        .into_iter()
        .map(|(key, row)| UnifiedRow {
            key,
            values: row.into_iter().map(|v| v.unwrap_or(0.0)).collect(),
        })
        .collect();

    MergeOutcome {
        report: UnifiedReport { columns, rows },
        reconciliation,
        unmatched_columns,
    }
}
