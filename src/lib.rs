//! Normalizes builder sales, CRM and web-traffic exports onto shared
//! (builder, community, year, month) keys and rolls them up into one
//! monthly report.

pub mod aggregator;
pub mod base;
pub mod community;
pub mod dates;
pub mod diagnostics;
pub mod error;
pub mod merger;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod table;

pub use aggregator::{aggregate_monthly, AggregateSpec, MetricSpec, MonthlyAggregate, PivotSpec, Reducer};
pub use base::{BaseRow, BaseTable};
pub use community::{Canonicalizer, CommunityRule, ExclusionList, Resolution, UnmatchedPolicy};
pub use dates::{DateNormalizer, DateOrder};
pub use diagnostics::QualityReport;
pub use error::{PipelineError, Result};
pub use merger::{merge, merge_with_schema, MergeOutcome, UnifiedReport};
pub use models::{Builder, Config, MonthKey, NormalizedKey, YearMonth};
pub use normalize::{KeyColumns, NormalizedTable, Normalizer, SourceReport};
pub use pipeline::{BuilderInputs, Pipeline, Rollup};
pub use table::Table;
