use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic value produced or consumed by compiled logic.
///
/// Qualities are numeric in practice, but function tables and display
/// formatters may hand back text, and predicates produce booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl Value {
    /// Numeric view used by arithmetic and ordering.
    ///
    /// Booleans count as 1/0; text that does not parse as a number is 0.
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    /// Truthiness used when a value stands in for a predicate ("nonzero").
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Named state variables of a play session.
pub type Qualities = FxHashMap<String, Value>;

/// Engine-side state visible to compiled logic beyond the qualities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Visit counts keyed by scene id, read by `@scene.id` references.
    pub visits: FxHashMap<String, u32>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `scene` has been visited; unvisited scenes are 0.
    pub fn visits(&self, scene: &str) -> u32 {
        self.visits.get(scene).copied().unwrap_or(0)
    }

    pub fn record_visit(&mut self, scene: &str) {
        *self.visits.entry(scene.to_string()).or_insert(0) += 1;
    }
}
