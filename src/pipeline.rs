use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::aggregator::{aggregate_monthly, AggregateSpec, MetricSpec, MonthlyAggregate, PivotSpec};
use crate::base::{load_targets, BaseTable, TOTAL_REVENUE, TOTAL_SALES};
use crate::community::{Canonicalizer, ExclusionList};
use crate::dates::DateNormalizer;
use crate::diagnostics::{QualityReport, SalesCheck};
use crate::error::Result;
use crate::merger::{merge_with_schema, MergeOutcome};
use crate::models::{Builder, BuilderSources, Config};
use crate::normalize::{KeyColumns, Normalizer};
use crate::table::Table;

pub const SALES: &str = "sales";
pub const CRM: &str = "crm";
pub const TRAFFIC: &str = "traffic";

pub const CRM_LEAD_COUNT: &str = "crm_lead_count";
pub const WEB_TRAFFIC: &str = "web_traffic";
pub const UNIQUE_USERS: &str = "unique_users";

/// Secondary metric columns every unified report carries, zero when the
/// source is not configured.
pub const SECONDARY_COLUMNS: [&str; 3] = [CRM_LEAD_COUNT, WEB_TRAFFIC, UNIQUE_USERS];

pub const SIMPLE_REPORT: &str = "final_report_simple.csv";
pub const DETAILED_REPORT: &str = "final_report_detailed.csv";
pub const QUALITY_REPORT: &str = "quality_report.md";

/// Raw tables of one builder, before any normalization.
#[derive(Debug, Clone)]
pub struct BuilderInputs {
    pub builder: Builder,
    pub sales: Table,
    pub targets: Table,
    pub crm: Option<Table>,
    pub traffic: Option<Table>,
    pub exclusions: ExclusionList,
}

impl BuilderInputs {
    /// Loads every file the builder's sources name. A configured file that
    /// does not exist is fatal.
    pub fn load(input_dir: &Path, sources: &BuilderSources) -> Result<Self> {
        let load = |file: &str| Table::load(&input_dir.join(file));
        Ok(Self {
            builder: sources.builder,
            sales: load(&sources.sales_file)?,
            targets: load(&sources.targets_file)?,
            crm: sources.crm_file.as_deref().map(load).transpose()?,
            traffic: sources.traffic_file.as_deref().map(load).transpose()?,
            exclusions: ExclusionList::new(&sources.excluded_communities),
        })
    }
}

/// Result of a full run, held in memory.
#[derive(Debug, Clone)]
pub struct Rollup {
    pub base: BaseTable,
    /// Monthly sales per builder, the source of the base sales columns.
    pub sales: Vec<MonthlyAggregate>,
    /// Secondary monthly aggregates in join order, with pivots where the
    /// source has them.
    pub aggregates: Vec<MonthlyAggregate>,
    pub simple: MergeOutcome,
    pub detailed: MergeOutcome,
    pub quality: QualityReport,
}

pub struct Pipeline {
    config: Config,
    normalizer: Normalizer,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let normalizer = Normalizer::new(
            DateNormalizer::new(config.date_order),
            Canonicalizer::new(&config.community_rules)?,
            config.unmatched_communities,
        );
        Ok(Self { config, normalizer })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn load_inputs(&self) -> Result<Vec<BuilderInputs>> {
        let input_dir = Path::new(&self.config.input_directory);
        self.config
            .builders
            .iter()
            .map(|sources| BuilderInputs::load(input_dir, sources))
            .collect()
    }

    /// Loads the configured inputs, transforms them and writes every output
    /// into `output_dir`.
    pub fn run(&self, output_dir: &Path) -> Result<(Rollup, Vec<PathBuf>)> {
        let inputs = self.load_inputs()?;
        let rollup = self.transform(&inputs)?;
        let written = self.write_outputs(&rollup, output_dir)?;
        Ok((rollup, written))
    }

    pub fn transform(&self, inputs: &[BuilderInputs]) -> Result<Rollup> {
        let columns = &self.config.columns;
        let mut quality = QualityReport::default();
        let mut base = BaseTable::new();
        let mut sales_aggregates = Vec::new();
        let mut crm_aggregates = Vec::new();
        let mut traffic_aggregates = Vec::new();

        let sales_spec = AggregateSpec::new(vec![
            MetricSpec::count(TOTAL_SALES),
            MetricSpec::sum(TOTAL_REVENUE, &columns.sales.price),
        ]);
        let crm_spec = AggregateSpec::new(vec![MetricSpec::count(CRM_LEAD_COUNT)]).with_pivots(
            columns
                .crm
                .pivots
                .iter()
                .map(|p| PivotSpec {
                    columns: p.candidates.clone(),
                    prefix: p.prefix.clone(),
                })
                .collect(),
        );
        let traffic_spec = AggregateSpec::new(vec![
            MetricSpec::sum(WEB_TRAFFIC, &columns.traffic.sessions),
            MetricSpec::sum(UNIQUE_USERS, &columns.traffic.users),
        ]);

        for input in inputs {
            info!("processing builder {}", input.builder);

            let (sales_rows, mut sales_report) = self.normalizer.normalize(
                &input.sales,
                SALES,
                input.builder,
                KeyColumns {
                    date: &columns.sales.date,
                    community: &columns.sales.community,
                },
                &input.exclusions,
            )?;
            let sales = aggregate_monthly(&sales_rows, &sales_spec, &mut sales_report)?;
            quality
                .conservation
                .push((sales_report.label(), sales.conserves_rows()));
            quality.sources.push(sales_report);

            let (targets, targets_report) = load_targets(
                &input.targets,
                input.builder,
                &columns.targets,
                &self.normalizer,
                &input.exclusions,
            )?;
            quality.sources.push(targets_report);
            base.extend(BaseTable::from_sources(input.builder, &sales, &targets));
            sales_aggregates.push(sales);

            if let Some(crm) = &input.crm {
                let (rows, mut report) = self.normalizer.normalize(
                    crm,
                    CRM,
                    input.builder,
                    KeyColumns {
                        date: &columns.crm.date,
                        community: &columns.crm.community,
                    },
                    &input.exclusions,
                )?;
                let aggregate = aggregate_monthly(&rows, &crm_spec, &mut report)?;
                quality
                    .conservation
                    .push((report.label(), aggregate.conserves_rows()));
                quality.sources.push(report);
                crm_aggregates.push(aggregate);
            }

            if let Some(traffic) = &input.traffic {
                let (rows, mut report) = self.normalizer.normalize(
                    traffic,
                    TRAFFIC,
                    input.builder,
                    KeyColumns {
                        date: &columns.traffic.date,
                        community: &columns.traffic.community,
                    },
                    &input.exclusions,
                )?;
                let aggregate = aggregate_monthly(&rows, &traffic_spec, &mut report)?;
                quality.sources.push(report);
                traffic_aggregates.push(aggregate);
            }
        }

        for (label, conserved) in &quality.conservation {
            if !conserved {
                warn!("{}: monthly counts do not add up to the kept rows", label);
            }
        }

        // CRM joins before traffic, every builder of one source together.
        let aggregates: Vec<MonthlyAggregate> =
            crm_aggregates.into_iter().chain(traffic_aggregates).collect();
        let simple_inputs: Vec<MonthlyAggregate> =
            aggregates.iter().map(|a| a.without_pivots()).collect();

        let simple = merge_with_schema(&base, &SECONDARY_COLUMNS, &simple_inputs);
        let detailed = merge_with_schema(&base, &SECONDARY_COLUMNS, &aggregates);
        quality.record_merge(&detailed);
        quality.sales_checks = sales_checks(&quality, &sales_aggregates, &simple);
        for check in quality.sales_checks.iter().filter(|c| !c.is_consistent()) {
            warn!(
                "builder {}: {} sales row(s) kept but {} in the report",
                check.builder, check.sales_rows, check.reported_sales
            );
        }

        info!(
            "unified report: {} row(s), {} simple and {} detailed column(s)",
            simple.report.len(),
            simple.report.columns.len(),
            detailed.report.columns.len()
        );

        Ok(Rollup {
            base,
            sales: sales_aggregates,
            aggregates,
            simple,
            detailed,
            quality,
        })
    }

    pub fn write_outputs(&self, rollup: &Rollup, output_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;
        let mut written = Vec::new();

        for aggregate in rollup.sales.iter().chain(&rollup.aggregates) {
            let builder = aggregate.builder.to_string().to_lowercase();
            let path = output_dir.join(format!("monthly_{}_{}.csv", aggregate.source, builder));
            aggregate.without_pivots().write_csv(&path)?;
            written.push(path);
            if aggregate.is_detailed() {
                let path = output_dir.join(format!(
                    "monthly_{}_detailed_{}.csv",
                    aggregate.source, builder
                ));
                aggregate.write_csv(&path)?;
                written.push(path);
            }
        }

        let path = output_dir.join(SIMPLE_REPORT);
        rollup.simple.report.write_csv(&path)?;
        written.push(path);

        let path = output_dir.join(DETAILED_REPORT);
        rollup.detailed.report.write_csv(&path)?;
        written.push(path);

        let path = output_dir.join(QUALITY_REPORT);
        fs::write(&path, rollup.quality.render())?;
        written.push(path);

        for path in &written {
            info!("wrote {}", path.display());
        }
        Ok(written)
    }
}

fn sales_checks(
    quality: &QualityReport,
    sales: &[MonthlyAggregate],
    merged: &MergeOutcome,
) -> Vec<SalesCheck> {
    let report = &merged.report;
    let sales_col = report.column(TOTAL_SALES);
    let revenue_col = report.column(TOTAL_REVENUE);
    sales
        .iter()
        .map(|aggregate| {
            let reported = |col: Option<usize>| -> f64 {
                col.map(|idx| {
                    report
                        .rows
                        .iter()
                        .filter(|r| r.key.builder == aggregate.builder)
                        .map(|r| r.values[idx])
                        .sum::<f64>()
                })
                .unwrap_or(0.0)
            };
            let sales_rows = quality
                .sources
                .iter()
                .filter(|s| s.source == SALES && s.builder == aggregate.builder)
                .map(|s| s.rows_normalized)
                .sum();
            SalesCheck {
                builder: aggregate.builder,
                sales_rows,
                reported_sales: reported(sales_col),
                aggregated_revenue: aggregate.column_total(TOTAL_REVENUE).unwrap_or(0.0),
                reported_revenue: reported(revenue_col),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> BuilderInputs {
        BuilderInputs {
            builder: Builder::A,
            sales: Table::from_strs(
                "sales",
                &["sale_contract_date", "community_name", "total_sale_price"],
                &[
                    &["2025-01-09", "Cedar Creek Ph 1", "$400,000"],
                    &["01/20/2025", "cedar creek", "410000"],
                    &["2025-02-03", "Fairview", "350000"],
                ],
            ),
            targets: Table::from_strs(
                "targets",
                &["community", "year", "month", "sales_target"],
                &[&["Cedar Creek", "2025", "1", "3"], &["Sunset Pines", "2025", "3", "2"]],
            ),
            crm: Some(Table::from_strs(
                "crm",
                &["createdate", "community", "hs_analytics_source", "hs_lead_status"],
                &[
                    &["2025-01-15", "cedar creek phase 1", "ORGANIC", "NEW"],
                    &["2025-01-16", "CedarCreek", "PAID", "NEW"],
                    &["2025-01-17", "Stonegate Heights - New Homes", "PAID", "NEW"],
                    &["2024-12-30", "Cedar Creek", "PAID", ""],
                ],
            )),
            traffic: None,
            exclusions: ExclusionList::new(["Stonegate Heights - New Homes"]),
        }
    }

    #[test]
    fn transform_builds_both_reports() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let rollup = pipeline.transform(&[inputs()]).unwrap();

        assert_eq!(rollup.base.len(), 3);
        let simple = &rollup.simple.report;
        assert_eq!(
            simple.columns,
            vec![
                TOTAL_SALES,
                TOTAL_REVENUE,
                "sales_target",
                CRM_LEAD_COUNT,
                WEB_TRAFFIC,
                UNIQUE_USERS
            ]
        );
        // (2025-01 Cedar Creek), (2025-02 Fairview Estates), (2025-03 Sunset Pines)
        assert_eq!(simple.rows[0].key.community, "Cedar Creek");
        assert_eq!(simple.value(0, TOTAL_SALES), Some(2.0));
        assert_eq!(simple.value(0, TOTAL_REVENUE), Some(810000.0));
        assert_eq!(simple.value(0, "sales_target"), Some(3.0));
        assert_eq!(simple.value(0, CRM_LEAD_COUNT), Some(2.0));
        assert_eq!(simple.value(2, TOTAL_SALES), Some(0.0));

        let detailed = &rollup.detailed.report;
        assert_eq!(detailed.len(), simple.len());
        assert_eq!(detailed.value(0, "source_ORGANIC"), Some(1.0));
        assert_eq!(detailed.value(0, "source_PAID"), Some(1.0));
        assert_eq!(detailed.value(0, "status_NEW"), Some(2.0));
        assert_eq!(detailed.value(1, "source_PAID"), Some(0.0));

        // The December lead has no base month and is reconciled, not added.
        let rec = &rollup.quality.reconciliation[0];
        assert_eq!(rec.dropped.len(), 1);
        assert!(rollup.quality.conservation.iter().all(|(_, ok)| *ok));
        assert!(rollup.quality.sources.iter().all(|s| s.is_balanced()));
        assert!(rollup.quality.sales_checks.iter().all(|c| c.is_consistent()));
        assert_eq!(rollup.quality.sales_checks[0].sales_rows, 3);
        // Unconfigured traffic still has its columns, all zero.
        assert!(rollup.quality.unmatched_columns.is_empty());
        assert!((0..simple.len()).all(|i| simple.value(i, WEB_TRAFFIC) == Some(0.0)));
    }

    #[test]
    fn report_schema_is_fixed_without_secondary_sources() {
        let mut sales_only = inputs();
        sales_only.crm = None;
        sales_only.traffic = None;
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let rollup = pipeline.transform(&[sales_only]).unwrap();

        let simple = &rollup.simple.report;
        assert_eq!(
            simple.headers(),
            vec![
                "builder",
                "community",
                "year",
                "month",
                TOTAL_SALES,
                TOTAL_REVENUE,
                "sales_target",
                CRM_LEAD_COUNT,
                WEB_TRAFFIC,
                UNIQUE_USERS
            ]
        );
        assert_eq!(rollup.detailed.report.columns, simple.columns);
        for column in SECONDARY_COLUMNS {
            assert!((0..simple.len()).all(|i| simple.value(i, column) == Some(0.0)));
        }
        assert!(rollup.aggregates.is_empty());
        assert_eq!(rollup.sales.len(), 1);
    }

    #[test]
    fn outputs_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let rollup = pipeline.transform(&[inputs()]).unwrap();
        let written = pipeline.write_outputs(&rollup, dir.path()).unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "monthly_sales_a.csv",
                "monthly_crm_a.csv",
                "monthly_crm_detailed_a.csv",
                SIMPLE_REPORT,
                DETAILED_REPORT,
                QUALITY_REPORT
            ]
        );
        let simple = fs::read_to_string(dir.path().join(SIMPLE_REPORT)).unwrap();
        let mut lines = simple.lines();
        assert_eq!(
            lines.next(),
            Some("builder,community,year,month,total_sales,total_revenue,sales_target,crm_lead_count,web_traffic,unique_users")
        );
        assert_eq!(lines.next(), Some("A,Cedar Creek,2025,1,2,810000,3,2,0,0"));

        let sales = fs::read_to_string(dir.path().join("monthly_sales_a.csv")).unwrap();
        assert_eq!(
            sales.lines().collect::<Vec<_>>(),
            vec![
                "community,year,month,total_sales,total_revenue",
                "Cedar Creek,2025,1,2,810000",
                "Fairview Estates,2025,2,1,350000",
            ]
        );
    }
}
