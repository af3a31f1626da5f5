use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::community::{CommunityRule, UnmatchedPolicy};
use crate::dates::DateOrder;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input_directory: String,
    pub output_directory: String,
    #[serde(default)]
    pub date_order: DateOrder,
    #[serde(default)]
    pub unmatched_communities: UnmatchedPolicy,
    // Evaluated in order; the first rule whose substrings all match wins.
    pub community_rules: Vec<CommunityRule>,
    pub builders: Vec<BuilderSources>,
    #[serde(default)]
    pub columns: ColumnConventions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSources {
    pub builder: Builder,
    pub sales_file: String,
    pub targets_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_file: Option<String>,
    /// Canonical names dropped from sales, targets, CRM and traffic before
    /// aggregation.
    #[serde(default)]
    pub excluded_communities: Vec<String>,
}

/// Column names per source type. Every field is a list of candidates; the
/// first one present in the file is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnConventions {
    #[serde(default)]
    pub sales: SalesColumns,
    #[serde(default)]
    pub targets: TargetColumns,
    #[serde(default)]
    pub crm: CrmColumns,
    #[serde(default)]
    pub traffic: TrafficColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesColumns {
    pub date: Vec<String>,
    pub community: Vec<String>,
    pub price: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetColumns {
    pub community: Vec<String>,
    pub year: Vec<String>,
    pub month: Vec<String>,
    pub target: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmColumns {
    pub date: Vec<String>,
    pub community: Vec<String>,
    /// Categorical dimensions pivoted into one column per category in the
    /// detailed report.
    pub pivots: Vec<PivotColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotColumn {
    pub candidates: Vec<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficColumns {
    pub date: Vec<String>,
    pub community: Vec<String>,
    pub sessions: Vec<String>,
    pub users: Vec<String>,
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for SalesColumns {
    fn default() -> Self {
        Self {
            date: names(&["sale_contract_date"]),
            community: names(&["community_name", "community"]),
            price: names(&["total_sale_price"]),
        }
    }
}

impl Default for TargetColumns {
    fn default() -> Self {
        Self {
            community: names(&["community", "community_name", "Subdivision"]),
            year: names(&["year"]),
            month: names(&["month"]),
            target: names(&["sales_target", "target"]),
        }
    }
}

impl Default for CrmColumns {
    fn default() -> Self {
        Self {
            date: names(&["createdate", "create_at"]),
            community: names(&["community"]),
            pivots: vec![
                PivotColumn {
                    candidates: names(&["hs_analytics_source", "sourcetype"]),
                    prefix: "source".to_string(),
                },
                PivotColumn {
                    candidates: names(&["hs_lead_status", "rating"]),
                    prefix: "status".to_string(),
                },
            ],
        }
    }
}

impl Default for TrafficColumns {
    fn default() -> Self {
        Self {
            date: names(&["date"]),
            community: names(&["community"]),
            sessions: names(&["sessions"]),
            users: names(&["users"]),
        }
    }
}

fn rule(all_of: &[&str], canonical: &str) -> CommunityRule {
    CommunityRule {
        all_of: names(all_of),
        canonical: canonical.to_string(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_directory: "data".to_string(),
            output_directory: "output".to_string(),
            date_order: DateOrder::MonthFirst,
            unmatched_communities: UnmatchedPolicy::PassThrough,
            community_rules: vec![
                rule(&["cedar", "creek"], "Cedar Creek"),
                rule(&["fairview"], "Fairview Estates"),
                rule(&["glenview"], "Glenview Meadows"),
                rule(&["riverbend"], "Riverbend Townhomes"),
                rule(&["maplewood"], "Maplewood Heights"),
                rule(&["oakridge"], "Oakridge Villas"),
                rule(&["sunset"], "Sunset Pines"),
                rule(&["willow", "creek"], "Willow Creek Meadows"),
            ],
            builders: vec![
                BuilderSources {
                    builder: Builder::A,
                    sales_file: "01A_sales_builder.csv".to_string(),
                    targets_file: "01A_target_sales_builder.csv".to_string(),
                    crm_file: Some("02A_api_crm_builder.csv".to_string()),
                    traffic_file: Some("02A_api_traffic_builder.csv".to_string()),
                    excluded_communities: vec!["Stonegate Heights - New Homes".to_string()],
                },
                BuilderSources {
                    builder: Builder::B,
                    sales_file: "01B_sales_builder.csv".to_string(),
                    targets_file: "01B_target_sales_builder.csv".to_string(),
                    crm_file: Some("02B_api_crm_builder.csv".to_string()),
                    traffic_file: Some("02B_api_traffic_builder.csv".to_string()),
                    excluded_communities: vec!["Conner Heights - New Homes".to_string()],
                },
            ],
            columns: ColumnConventions::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Structural checks that do not need any input file. Rule checks live in
    /// `Canonicalizer::new`.
    pub fn validate(&self) -> Result<()> {
        if self.builders.is_empty() {
            return Err(PipelineError::Configuration(
                "at least one builder must be configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for sources in &self.builders {
            if !seen.insert(sources.builder) {
                return Err(PipelineError::Configuration(format!(
                    "builder {} is configured more than once",
                    sources.builder
                )));
            }
        }
        crate::community::Canonicalizer::new(&self.community_rules)?;
        Ok(())
    }
}

/// Business entity whose data is tracked separately on a shared schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Builder {
    A,
    B,
}

impl fmt::Display for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builder::A => write!(f, "A"),
            Builder::B => write!(f, "B"),
        }
    }
}

/// Join grain of a single builder's monthly aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub community: String,
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(community: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            community: community.into(),
            year,
            month,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:04}-{:02}", self.community, self.year, self.month)
    }
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Key of the unified report. Orders by (year, month, builder, community).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    pub builder: Builder,
    pub community: String,
    pub year: i32,
    pub month: u32,
}

impl NormalizedKey {
    pub fn new(builder: Builder, month_key: MonthKey) -> Self {
        Self {
            builder,
            community: month_key.community,
            year: month_key.year,
            month: month_key.month,
        }
    }

    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.community.clone(), self.year, self.month)
    }
}

impl Ord for NormalizedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then_with(|| self.month.cmp(&other.month))
            .then_with(|| self.builder.cmp(&other.builder))
            .then_with(|| self.community.cmp(&other.community))
    }
}

impl PartialOrd for NormalizedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
