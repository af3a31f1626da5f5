// tests/properties.rs
//
// Invariants of the roll-up checked over a larger synthetic data set.
//
use community_rollup::aggregator::{aggregate_monthly, AggregateSpec, MetricSpec, PivotSpec};
use community_rollup::community::CommunityReport;
use community_rollup::{
    merge, BaseRow, BaseTable, Builder, Canonicalizer, Config, DateNormalizer, DateOrder,
    ExclusionList, KeyColumns, Normalizer, Resolution, Table, UnmatchedPolicy,
};

const RAW_NAMES: [&str; 8] = [
    "Cedar Creek Ph 2",
    "FAIRVIEW",
    "glenview meadows",
    "Riverbend - Townhomes",
    "Maplewood",
    "oakridge villas phase 3",
    "Sunset Pines",
    "Willow Creek",
];

const SOURCES: [&str; 3] = ["ORGANIC", "PAID", "REFERRAL"];

fn normalizer() -> Normalizer {
    Normalizer::new(
        DateNormalizer::default(),
        Canonicalizer::new(&Config::default().community_rules).unwrap(),
        UnmatchedPolicy::PassThrough,
    )
}

/// 200 leads spread over communities, months and lead sources.
fn crm_table() -> Table {
    let rows: Vec<Vec<String>> = (0..200usize)
        .map(|i| {
            let month = i % 12 + 1;
            let day = i % 28 + 1;
            // Alternate between two explicit formats.
            let date = if i % 2 == 0 {
                format!("2024-{:02}-{:02}", month, day)
            } else {
                format!("{:02}/{:02}/2024", month, day)
            };
            vec![
                date,
                RAW_NAMES[i * 7 % RAW_NAMES.len()].to_string(),
                SOURCES[i % SOURCES.len()].to_string(),
            ]
        })
        .collect();
    Table::new(
        "crm",
        vec![
            "createdate".to_string(),
            "community".to_string(),
            "hs_analytics_source".to_string(),
        ],
        rows,
    )
}

fn base(normalizer: &Normalizer) -> BaseTable {
    // Every other month of every community, for both builders.
    let rows = RAW_NAMES.iter().flat_map(|name| {
        [Builder::B, Builder::A].into_iter().flat_map(move |builder| {
            (1..=12).step_by(2).map(move |month| BaseRow {
                builder,
                community: name.to_string(),
                year: 2024,
                month,
                total_sales: 1.0,
                total_revenue: 250000.0,
                sales_target: 2.0,
            })
        })
    });
    let mut unmatched = CommunityReport::default();
    let base = BaseTable::from_rows(rows, normalizer.communities(), &mut unmatched);
    assert!(unmatched.unmatched.is_empty());
    base
}

fn leads(normalizer: &Normalizer) -> community_rollup::MonthlyAggregate {
    let date = vec!["createdate".to_string()];
    let community = vec!["community".to_string()];
    let (rows, mut report) = normalizer
        .normalize(
            &crm_table(),
            "crm",
            Builder::A,
            KeyColumns {
                date: &date,
                community: &community,
            },
            &ExclusionList::default(),
        )
        .unwrap();
    assert_eq!(rows.len(), 200);
    let spec = AggregateSpec::new(vec![MetricSpec::count("crm_lead_count")]).with_pivots(vec![
        PivotSpec {
            columns: vec!["hs_analytics_source".to_string()],
            prefix: "source".to_string(),
        },
    ]);
    aggregate_monthly(&rows, &spec, &mut report).unwrap()
}

#[test]
fn canonical_names_are_fixed_points() {
    let canonicalizer = Canonicalizer::new(&Config::default().community_rules).unwrap();
    for name in canonicalizer.canonical_names() {
        assert_eq!(canonicalizer.resolve(name), Resolution::Canonical(name.to_string()));
    }
    for raw in RAW_NAMES {
        let once = canonicalizer.resolve(raw);
        assert!(once.is_matched(), "{raw} should match a rule");
        assert_eq!(canonicalizer.resolve(once.name()), once);
    }
}

#[test]
fn explicit_formats_agree_on_unambiguous_dates() {
    for order in [DateOrder::MonthFirst, DateOrder::DayFirst] {
        let dates = DateNormalizer::new(order);
        for day in [13, 20, 28] {
            let iso = dates.parse(&format!("2025-03-{day}")).unwrap();
            let variants = [
                format!("03/{day}/2025"),
                format!("{day}/03/2025"),
                format!("2025/03/{day}"),
                format!("{day}-03-2025"),
                format!("03-{day}-2025"),
            ];
            for variant in variants {
                assert_eq!(dates.parse(&variant), Some(iso), "{variant} under {order:?}");
            }
        }
    }
}

#[test]
fn monthly_counts_conserve_rows() {
    let normalizer = normalizer();
    let aggregate = leads(&normalizer);
    assert!(aggregate.conserves_rows());
    assert_eq!(aggregate.column_total("crm_lead_count"), Some(200.0));
    let pivot_total: f64 = SOURCES
        .iter()
        .filter_map(|s| aggregate.column_total(&format!("source_{s}")))
        .sum();
    assert_eq!(pivot_total, 200.0);
}

#[test]
fn unified_rows_are_sorted_unique_and_zero_filled() {
    let normalizer = normalizer();
    let base = base(&normalizer);
    let aggregate = leads(&normalizer);
    let outcome = merge(&base, &[aggregate.clone()]);
    let report = &outcome.report;

    assert_eq!(report.len(), base.len());
    for pair in report.rows.windows(2) {
        let (a, b) = (&pair[0].key, &pair[1].key);
        let ka = (a.year, a.month, a.builder, &a.community);
        let kb = (b.year, b.month, b.builder, &b.community);
        assert!(ka < kb, "{ka:?} should sort before {kb:?}");
    }

    let lead_col = report.column("crm_lead_count").unwrap();
    for row in &report.rows {
        let expected = match row.key.builder {
            Builder::A => aggregate.value(&row.key.month_key(), "crm_lead_count"),
            Builder::B => None,
        };
        assert_eq!(row.values[lead_col], expected.unwrap_or(0.0));
        assert!(row.values.iter().all(|v| v.is_finite()));
    }

    // Everything the join did not keep is accounted for in reconciliation.
    let rec = &outcome.reconciliation[0];
    let kept: f64 = report.rows.iter().map(|r| r.values[lead_col]).sum();
    assert_eq!(kept + rec.dropped_total("crm_lead_count"), 200.0);
    assert_eq!(rec.matched_rows + rec.dropped.len(), rec.aggregate_rows);
}
