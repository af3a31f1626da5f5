use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{Builder, MonthKey};
use crate::normalize::{NormalizedTable, SourceReport};
use crate::table::{format_metric, parse_number, write_csv};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reducer {
    /// Number of rows in the group.
    Count,
    /// Sum of the first candidate column present; blank cells contribute nothing.
    Sum(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSpec {
    pub name: String,
    pub reducer: Reducer,
}

impl MetricSpec {
    pub fn count(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reducer: Reducer::Count,
        }
    }

    pub fn sum(name: &str, columns: &[String]) -> Self {
        Self {
            name: name.to_string(),
            reducer: Reducer::Sum(columns.to_vec()),
        }
    }
}

/// Categorical column spread into one `{prefix}_{category}` count column per
/// observed category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotSpec {
    pub columns: Vec<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSpec {
    pub metrics: Vec<MetricSpec>,
    pub pivots: Vec<PivotSpec>,
}

impl AggregateSpec {
    pub fn new(metrics: Vec<MetricSpec>) -> Self {
        Self {
            metrics,
            pivots: Vec::new(),
        }
    }

    pub fn with_pivots(mut self, pivots: Vec<PivotSpec>) -> Self {
        self.pivots = pivots;
        self
    }

    pub fn is_detailed(&self) -> bool {
        !self.pivots.is_empty()
    }
}

/// One row per observed `(community, year, month)` of one builder's source.
#[derive(Debug, Clone)]
pub struct MonthlyAggregate {
    pub source: String,
    pub builder: Builder,
    pub columns: Vec<String>,
    pub rows: BTreeMap<MonthKey, Vec<f64>>,
    /// `columns[..metric_columns]` are metrics; the rest are pivot counts.
    pub metric_columns: usize,
    /// Rows of the normalized table the aggregate was built from.
    pub input_rows: usize,
    count_columns: Vec<usize>,
}

impl MonthlyAggregate {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, key: &MonthKey) -> Option<&[f64]> {
        self.rows.get(key).map(|v| v.as_slice())
    }

    pub fn value(&self, key: &MonthKey, column: &str) -> Option<f64> {
        let idx = self.column(column)?;
        self.rows.get(key).map(|values| values[idx])
    }

    pub fn column_total(&self, name: &str) -> Option<f64> {
        let idx = self.column(name)?;
        Some(self.rows.values().map(|values| values[idx]).sum())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_detailed(&self) -> bool {
        self.columns.len() > self.metric_columns
    }

    /// The same aggregate with its pivot columns removed.
    pub fn without_pivots(&self) -> MonthlyAggregate {
        MonthlyAggregate {
            source: self.source.clone(),
            builder: self.builder,
            columns: self.columns[..self.metric_columns].to_vec(),
            rows: self
                .rows
                .iter()
                .map(|(key, values)| (key.clone(), values[..self.metric_columns].to_vec()))
                .collect(),
            metric_columns: self.metric_columns,
            input_rows: self.input_rows,
            count_columns: self.count_columns.clone(),
        }
    }

    /// Every count column sums to the number of input rows.
    pub fn conserves_rows(&self) -> bool {
        self.count_columns.iter().all(|&idx| {
            let total: f64 = self.rows.values().map(|values| values[idx]).sum();
            total as usize == self.input_rows
        })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut headers = vec![
            "community".to_string(),
            "year".to_string(),
            "month".to_string(),
        ];
        headers.extend(self.columns.iter().cloned());
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|(key, values)| {
                let mut row = vec![
                    key.community.clone(),
                    key.year.to_string(),
                    key.month.to_string(),
                ];
                row.extend(values.iter().map(|v| format_metric(*v)));
                row
            })
            .collect();
        write_csv(path, &headers, &rows)
    }
}

enum ResolvedMetric {
    Count,
    Sum { index: usize, column: String },
}

/// Groups a normalized table by month key and reduces it. Months without
/// rows are absent from the result rather than zero.
pub fn aggregate_monthly(
    table: &NormalizedTable,
    spec: &AggregateSpec,
    report: &mut SourceReport,
) -> Result<MonthlyAggregate> {
    let lookup = |candidates: &[String]| {
        candidates
            .iter()
            .find_map(|c| table.headers.iter().position(|h| h == c))
            .ok_or_else(|| crate::error::PipelineError::MissingColumn {
                table: format!("{} {}", table.source, table.builder),
                candidates: candidates.to_vec(),
            })
    };

    let mut resolved = Vec::with_capacity(spec.metrics.len());
    for metric in &spec.metrics {
        resolved.push(match &metric.reducer {
            Reducer::Count => ResolvedMetric::Count,
            Reducer::Sum(candidates) => {
                let index = lookup(candidates)?;
                ResolvedMetric::Sum {
                    index,
                    column: table.headers[index].clone(),
                }
            }
        });
    }
    let pivot_indices = spec
        .pivots
        .iter()
        .map(|pivot| lookup(&pivot.columns))
        .collect::<Result<Vec<_>>>()?;

    let mut sums: BTreeMap<MonthKey, Vec<f64>> = BTreeMap::new();
    let mut pivot_counts: Vec<HashMap<(MonthKey, String), f64>> =
        vec![HashMap::new(); spec.pivots.len()];
    let mut categories: Vec<BTreeSet<String>> = vec![BTreeSet::new(); spec.pivots.len()];

    for row in &table.rows {
        let values = sums
            .entry(row.key.clone())
            .or_insert_with(|| vec![0.0; resolved.len()]);
        for (slot, metric) in resolved.iter().enumerate() {
            match metric {
                ResolvedMetric::Count => values[slot] += 1.0,
                ResolvedMetric::Sum { index, column } => match parse_number(&row.fields[*index]) {
                    Ok(Some(v)) => values[slot] += v,
                    Ok(None) => {}
                    Err(()) => report.record_non_numeric(column, row.fields[*index].trim()),
                },
            }
        }
        for (p, &index) in pivot_indices.iter().enumerate() {
            let category = row.fields[index].trim();
            if category.is_empty() {
                continue;
            }
            categories[p].insert(category.to_string());
            *pivot_counts[p]
                .entry((row.key.clone(), category.to_string()))
                .or_insert(0.0) += 1.0;
        }
    }

    let mut columns: Vec<String> = spec.metrics.iter().map(|m| m.name.clone()).collect();
    for (p, pivot) in spec.pivots.iter().enumerate() {
        columns.extend(
            categories[p]
                .iter()
                .map(|category| format!("{}_{}", pivot.prefix, category)),
        );
    }

    let rows = sums
        .into_iter()
        .map(|(key, mut values)| {
            for (p, cats) in categories.iter().enumerate() {
                for category in cats {
                    let count = pivot_counts[p]
                        .get(&(key.clone(), category.clone()))
                        .copied()
                        .unwrap_or(0.0);
                    values.push(count);
                }
            }
            (key, values)
        })
        .collect();

    let count_columns = resolved
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m, ResolvedMetric::Count))
        .map(|(i, _)| i)
        .collect();

    let aggregate = MonthlyAggregate {
        source: table.source.clone(),
        builder: table.builder,
        columns,
        rows,
        metric_columns: spec.metrics.len(),
        input_rows: table.len(),
        count_columns,
    };

    for (column, issue) in &report.non_numeric {
        warn!(
            "{}: {} non-numeric value(s) in '{}', e.g. {}",
            report.label(),
            issue.count,
            column,
            issue.samples.join(", ")
        );
    }
    if !aggregate.conserves_rows() {
        warn!(
            "{}: monthly counts do not add up to {} input rows",
            report.label(),
            aggregate.input_rows
        );
    }
    info!(
        "{}: aggregated to {} community-month(s), {} column(s)",
        report.label(),
        aggregate.len(),
        aggregate.columns.len()
    );
    Ok(aggregate)
}
