// tests/end_to_end.rs
use std::fs;
use std::path::Path;

use community_rollup::aggregator::{aggregate_monthly, AggregateSpec, MetricSpec};
use community_rollup::pipeline::{DETAILED_REPORT, QUALITY_REPORT, SIMPLE_REPORT};
use community_rollup::{
    merge, BaseRow, BaseTable, Builder, Config, DateNormalizer, ExclusionList, KeyColumns,
    MonthKey, Normalizer, Pipeline, PipelineError, Table, UnmatchedPolicy,
};
use community_rollup::community::CommunityReport;
use community_rollup::Canonicalizer;

fn normalizer() -> Normalizer {
    Normalizer::new(
        DateNormalizer::default(),
        Canonicalizer::new(&Config::default().community_rules).unwrap(),
        UnmatchedPolicy::PassThrough,
    )
}

fn base_row(community: &str, month: u32, sales: f64) -> BaseRow {
    BaseRow {
        builder: Builder::A,
        community: community.to_string(),
        year: 2025,
        month,
        total_sales: sales,
        total_revenue: 0.0,
        sales_target: 0.0,
    }
}

#[test]
fn crm_leads_land_on_canonical_base_rows() {
    let normalizer = normalizer();
    let mut unmatched = CommunityReport::default();
    let base = BaseTable::from_rows(
        vec![base_row("Cedar Creek Ph 1", 1, 5.0), base_row("Cedar Creek", 2, 3.0)],
        normalizer.communities(),
        &mut unmatched,
    );
    assert!(unmatched.unmatched.is_empty());

    let crm = Table::from_strs(
        "crm",
        &["createdate", "community"],
        &[
            &["2025-01-15", "cedar creek phase 1"],
            &["2025-01-15", "cedar creek phase 1"],
            &["2025-01-15", "cedar creek phase 1"],
            &["2025-02-10", "CedarCreek"],
            &["2025-02-10", "CedarCreek"],
        ],
    );
    let date = vec!["createdate".to_string()];
    let community = vec!["community".to_string()];
    let (rows, mut report) = normalizer
        .normalize(
            &crm,
            "crm",
            Builder::A,
            KeyColumns {
                date: &date,
                community: &community,
            },
            &ExclusionList::default(),
        )
        .unwrap();
    assert!(rows.rows.iter().all(|r| r.key.community == "Cedar Creek"));

    let spec = AggregateSpec::new(vec![MetricSpec::count("crm_lead_count")]);
    let leads = aggregate_monthly(&rows, &spec, &mut report).unwrap();
    let monthly: Vec<(MonthKey, f64)> = leads
        .rows
        .iter()
        .map(|(k, v)| (k.clone(), v[0]))
        .collect();
    assert_eq!(
        monthly,
        vec![
            (MonthKey::new("Cedar Creek", 2025, 1), 3.0),
            (MonthKey::new("Cedar Creek", 2025, 2), 2.0),
        ]
    );

    let outcome = merge(&base, &[leads]);
    let report = &outcome.report;
    let merged: Vec<(Builder, String, i32, u32, Option<f64>, Option<f64>)> = (0..report.len())
        .map(|i| {
            let key = &report.rows[i].key;
            (
                key.builder,
                key.community.clone(),
                key.year,
                key.month,
                report.value(i, "total_sales"),
                report.value(i, "crm_lead_count"),
            )
        })
        .collect();
    assert_eq!(
        merged,
        vec![
            (Builder::A, "Cedar Creek".to_string(), 2025, 1, Some(5.0), Some(3.0)),
            (Builder::A, "Cedar Creek".to_string(), 2025, 2, Some(3.0), Some(2.0)),
        ]
    );
    assert!(outcome.reconciliation.iter().all(|r| r.is_complete()));
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn fixture_config(input: &Path) -> Config {
    let mut config = Config::default();
    config.input_directory = input.to_string_lossy().into_owned();

    write(
        input,
        "01A_sales_builder.csv",
        "sale_contract_date,community_name,total_sale_price\n\
         2025-01-09,Cedar Creek Ph 1,\"$400,000\"\n\
         01/20/2025,Fairview,350000\n\
         not a date,Fairview,1\n",
    );
    write(
        input,
        "01A_target_sales_builder.csv",
        "community,year,month,sales_target\nCedar Creek,2025,1,2\nFairview Estates,2025,2,1\n",
    );
    write(
        input,
        "02A_api_crm_builder.csv",
        "create_at,community,sourcetype,rating\n\
         2025-01-15T09:30:00Z,cedar creek phase 1,ORGANIC,HOT\n\
         2025-01-16,Stonegate Heights - New Homes,PAID,COLD\n\
         2025-02-01,fairview estates,PAID,HOT\n",
    );
    write(
        input,
        "02A_api_traffic_builder.csv",
        "date,community,sessions,users\n\
         2025-01-01,Cedar Creek,120,80\n\
         2025-01-02,Cedar Creek,30,n/a\n\
         2025-03-01,Cedar Creek,10,5\n",
    );
    // Builder B has sales and targets only; Latin-1 bytes in its file.
    fs::write(
        input.join("01B_sales_builder.csv"),
        b"sale_contract_date,community_name,total_sale_price\n2025-01-05,Glenview Caf\xe9,200000\n",
    )
    .unwrap();
    write(
        input,
        "01B_target_sales_builder.csv",
        "Subdivision,year,month,target\nGlenview Meadows,2025,1,1\n",
    );
    config.builders[1].crm_file = None;
    config.builders[1].traffic_file = None;
    config
}

#[test]
fn full_run_writes_reports_from_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(fixture_config(input.path())).unwrap();

    let (rollup, written) = pipeline.run(output.path()).unwrap();
    assert!(written.iter().all(|p| p.exists()));

    let simple = fs::read_to_string(output.path().join(SIMPLE_REPORT)).unwrap();
    let lines: Vec<&str> = simple.lines().collect();
    assert_eq!(
        lines,
        vec![
            "builder,community,year,month,total_sales,total_revenue,sales_target,crm_lead_count,web_traffic,unique_users",
            "A,Cedar Creek,2025,1,1,400000,2,1,150,80",
            "A,Fairview Estates,2025,1,1,350000,0,0,0,0",
            "B,Glenview Meadows,2025,1,1,200000,1,0,0,0",
            "A,Fairview Estates,2025,2,0,0,1,1,0,0",
        ]
    );
    // 01/20/2025 reads month-first, so the Fairview sale is a January one.
    assert_eq!(rollup.base.len(), 4);
    let traffic = rollup
        .quality
        .reconciliation
        .iter()
        .find(|r| r.source == "traffic")
        .unwrap();
    assert_eq!(traffic.dropped_total("web_traffic"), 10.0);

    let detailed = fs::read_to_string(output.path().join(DETAILED_REPORT)).unwrap();
    let header = detailed.lines().next().unwrap();
    assert!(header.ends_with("web_traffic,unique_users,source_ORGANIC,source_PAID,status_HOT"));

    let quality = fs::read_to_string(output.path().join(QUALITY_REPORT)).unwrap();
    assert!(quality.contains("not a date"));
    assert!(quality.contains("Stonegate Heights - New Homes"));
    assert!(quality.contains("n/a"));
    assert!(rollup.quality.sources.iter().all(|s| s.is_balanced()));
    // Traffic runs into March while builder A's sales stop in January.
    assert!(quality.contains("## Date Coverage"));
    assert_eq!(rollup.quality.coverage_gaps(), vec![Builder::A]);
    assert!(output.path().join("monthly_sales_b.csv").exists());
    assert!(rollup.quality.sales_checks.iter().all(|c| c.is_consistent()));
    assert!(rollup.quality.issue_count() > 0);
}

#[test]
fn missing_input_file_aborts_the_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = fixture_config(input.path());
    fs::remove_file(input.path().join("02A_api_traffic_builder.csv")).unwrap();

    let err = Pipeline::new(config).unwrap().run(output.path()).unwrap_err();
    assert!(matches!(err, PipelineError::MissingFile(_)));
    assert!(!output.path().join(SIMPLE_REPORT).exists());
}

#[test]
fn missing_required_column_aborts_the_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = fixture_config(input.path());
    write(
        input.path(),
        "02A_api_crm_builder.csv",
        "when,community\n2025-01-15,Cedar Creek\n",
    );

    let err = Pipeline::new(config).unwrap().run(output.path()).unwrap_err();
    match err {
        PipelineError::MissingColumn { candidates, .. } => {
            assert_eq!(candidates, vec!["createdate", "create_at"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}
