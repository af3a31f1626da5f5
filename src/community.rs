use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Result};

/// Maps any raw name containing every `all_of` substring (case-insensitive)
/// to `canonical`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRule {
    pub all_of: Vec<String>,
    pub canonical: String,
}

/// What to do with rows whose community matches no rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Keep the raw name and warn.
    #[default]
    PassThrough,
    /// Drop the rows before aggregation.
    Drop,
    /// Abort the run.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Canonical(String),
    Unmatched(String),
}

impl Resolution {
    pub fn name(&self) -> &str {
        match self {
            Resolution::Canonical(name) | Resolution::Unmatched(name) => name,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Canonical(_))
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    needles: Vec<String>,
    canonical: String,
}

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    rules: Vec<CompiledRule>,
}

impl Canonicalizer {
    /// Compiles the rule table. Rejects empty substrings and rules whose
    /// canonical name would not resolve back to itself.
    pub fn new(rules: &[CommunityRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let needles: Vec<String> = rule
                .all_of
                .iter()
                .map(|needle| needle.trim().to_lowercase())
                .collect();
            if needles.is_empty() || needles.iter().any(|n| n.is_empty()) {
                return Err(PipelineError::Configuration(format!(
                    "community rule for '{}' has an empty substring list or entry",
                    rule.canonical
                )));
            }
            compiled.push(CompiledRule {
                needles,
                canonical: rule.canonical.trim().to_string(),
            });
        }

        let canonicalizer = Self { rules: compiled };
        for rule in &canonicalizer.rules {
            let resolved = canonicalizer.resolve(&rule.canonical);
            if resolved != Resolution::Canonical(rule.canonical.clone()) {
                return Err(PipelineError::Configuration(format!(
                    "canonical name '{}' resolves to '{}'; reorder or tighten the rules",
                    rule.canonical,
                    resolved.name()
                )));
            }
        }
        Ok(canonicalizer)
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        let name = raw.trim();
        let lowered = name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.needles.iter().all(|n| lowered.contains(n.as_str())))
            .map(|rule| Resolution::Canonical(rule.canonical.clone()))
            .unwrap_or_else(|| Resolution::Unmatched(name.to_string()))
    }

    pub fn canonical_names(&self) -> BTreeSet<&str> {
        self.rules.iter().map(|r| r.canonical.as_str()).collect()
    }
}

/// Per-table tally of community resolution.
#[derive(Debug, Clone, Default)]
pub struct CommunityReport {
    pub missing: usize,
    pub unmatched: BTreeMap<String, usize>,
    pub unmatched_dropped: usize,
    pub excluded: BTreeMap<String, usize>,
}

impl CommunityReport {
    /// Counts an unmatched name, warning the first time it is seen.
    pub fn record_unmatched(&mut self, table: &str, name: &str) {
        let count = self.unmatched.entry(name.to_string()).or_insert(0);
        if *count == 0 {
            warn!("{}: unknown community name '{}'", table, name);
        }
        *count += 1;
    }

    pub fn record_excluded(&mut self, name: &str) {
        *self.excluded.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn unmatched_rows(&self) -> usize {
        self.unmatched.values().sum()
    }

    pub fn excluded_rows(&self) -> usize {
        self.excluded.values().sum()
    }
}

/// Names removed from a table after canonicalization.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    names: BTreeSet<String>,
}

impl ExclusionList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
