//! Column type rules: which target kind each source column is normalized to.
//!
//! Rules are keyed by upper-cased column name and loaded once per run. Rule
//! sets are applied in order, so a later set overrides an earlier one for the
//! same column; per-table sets are layered on top of the shared registry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic kind of a target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Date,
    Timestamp,
    Interval,
    Numeric { precision: u32, scale: u32 },
    Passthrough,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Date => write!(f, "DATE"),
            ColumnKind::Timestamp => write!(f, "TIMESTAMP"),
            ColumnKind::Interval => write!(f, "INTERVAL"),
            ColumnKind::Numeric { precision, scale } => {
                write!(f, "NUMBER({},{})", precision, scale)
            }
            ColumnKind::Passthrough => write!(f, "PASSTHROUGH"),
        }
    }
}

/// One column's rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypeRule {
    /// Upper-cased column name.
    pub column_name: String,
    pub kind: ColumnKind,
}

impl ColumnTypeRule {
    pub fn new(column_name: &str, kind: ColumnKind) -> Self {
        Self {
            column_name: column_name.to_uppercase(),
            kind,
        }
    }
}

/// Declared precision and scale of a fixed-point column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericSpec {
    pub precision: u32,
    #[serde(default)]
    pub scale: u32,
}

/// A group of rules as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRuleSet {
    /// Columns loaded as date-only values.
    #[serde(default)]
    pub date: Vec<String>,

    /// Columns loaded as whole-second timestamps.
    #[serde(default)]
    pub timestamp: Vec<String>,

    /// Columns loaded as durations.
    #[serde(default)]
    pub interval: Vec<String>,

    /// Fixed-point columns with their declared precision/scale.
    #[serde(default)]
    pub numeric: std::collections::BTreeMap<String, NumericSpec>,
}

impl TypeRuleSet {
    /// Flatten into rules; within one set the order is date, timestamp,
    /// interval, numeric.
    pub fn rules(&self) -> Vec<ColumnTypeRule> {
        let mut rules = Vec::new();
        rules.extend(self.date.iter().map(|c| ColumnTypeRule::new(c, ColumnKind::Date)));
        rules.extend(
            self.timestamp
                .iter()
                .map(|c| ColumnTypeRule::new(c, ColumnKind::Timestamp)),
        );
        rules.extend(
            self.interval
                .iter()
                .map(|c| ColumnTypeRule::new(c, ColumnKind::Interval)),
        );
        rules.extend(self.numeric.iter().map(|(c, spec)| {
            ColumnTypeRule::new(
                c,
                ColumnKind::Numeric {
                    precision: spec.precision,
                    scale: spec.scale,
                },
            )
        }));
        rules
    }

    /// Upper-cased column names declared under more than one kind.
    pub fn conflicting_columns(&self) -> Vec<String> {
        let mut seen: HashMap<String, ColumnKind> = HashMap::new();
        let mut conflicts = Vec::new();
        for rule in self.rules() {
            if let Some(prev) = seen.insert(rule.column_name.clone(), rule.kind) {
                if prev != rule.kind && !conflicts.contains(&rule.column_name) {
                    conflicts.push(rule.column_name);
                }
            }
        }
        conflicts
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
            && self.timestamp.is_empty()
            && self.interval.is_empty()
            && self.numeric.is_empty()
    }
}

/// Read-only lookup from column name to [`ColumnKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRuleRegistry {
    rules: HashMap<String, ColumnKind>,
}

impl TypeRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rule sets, later sets overriding earlier ones.
    pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a TypeRuleSet>) -> Self {
        let mut registry = Self::new();
        for set in sets {
            registry.extend(set.rules());
        }
        registry
    }

    /// Add or override one rule.
    pub fn insert(&mut self, rule: ColumnTypeRule) {
        self.rules.insert(rule.column_name, rule.kind);
    }

    /// Add or override rules in order.
    pub fn extend(&mut self, rules: impl IntoIterator<Item = ColumnTypeRule>) {
        for rule in rules {
            self.insert(rule);
        }
    }

    /// A copy with `overrides` layered on top.
    #[must_use]
    pub fn with_overrides(&self, overrides: &TypeRuleSet) -> Self {
        let mut registry = self.clone();
        registry.extend(overrides.rules());
        registry
    }

    /// Kind for a column name (case-insensitive); PASSTHROUGH if unknown.
    pub fn kind_of(&self, column: &str) -> ColumnKind {
        self.rules
            .get(&column.to_uppercase())
            .copied()
            .unwrap_or(ColumnKind::Passthrough)
    }

    /// Resolve kinds for a whole header, in header order.
    pub fn resolve(&self, header: &[String]) -> Vec<ColumnKind> {
        header.iter().map(|c| self.kind_of(c)).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
