//! Scenario matrix: the explicit list of (handset, plan) pairs to run.
//!
//! The set is data, not a Cartesian product. Most handsets are paired with
//! the first plan only, while the first handset is also tried against the
//! alternate plans.

use crate::result::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One parametrisation of the purchase journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scenario {
    /// Zero-based ordinal among the rendered handset cards
    pub handset_index: usize,
    /// Zero-based ordinal among the rendered "Get this plan" buttons
    pub plan_index: usize,
}

impl Scenario {
    /// Create a new scenario
    #[must_use]
    pub const fn new(handset_index: usize, plan_index: usize) -> Self {
        Self {
            handset_index,
            plan_index,
        }
    }

    /// Short identifier used in file names and report keys
    #[must_use]
    pub fn id(&self) -> String {
        format!("h{}-p{}", self.handset_index, self.plan_index)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handset #{}, plan #{}",
            self.handset_index, self.plan_index
        )
    }
}

impl FromStr for Scenario {
    type Err = FlowError;

    /// Parse `"<handset>:<plan>"`, e.g. `"1:0"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (handset, plan) = s
            .split_once(':')
            .ok_or_else(|| FlowError::config(format!("scenario '{s}' must be <handset>:<plan>")))?;
        let parse = |part: &str, what: &str| {
            part.trim().parse::<usize>().map_err(|e| {
                FlowError::config(format!("scenario '{s}' has an invalid {what} index: {e}"))
            })
        };
        Ok(Self::new(parse(handset, "handset")?, parse(plan, "plan")?))
    }
}

/// Ordered, re-enumerable list of scenarios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioMatrix {
    scenarios: Vec<Scenario>,
}

/// Pairs exercised when no matrix is configured
pub const DEFAULT_PAIRS: [(usize, usize); 8] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (1, 0),
    (2, 0),
    (3, 0),
    (4, 0),
    (5, 0),
];

impl Default for ScenarioMatrix {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_PAIRS)
    }
}

impl ScenarioMatrix {
    /// Build a matrix from explicit scenarios, keeping their order
    #[must_use]
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    /// Build a matrix from `(handset, plan)` pairs
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(h, p)| Scenario::new(h, p))
                .collect(),
        )
    }

    /// Parse a list of `"h:p"` strings
    pub fn parse_all<S: AsRef<str>>(items: &[S]) -> FlowResult<Self> {
        items
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<FlowResult<Vec<_>>>()
            .map(Self::new)
    }

    /// Iterate in stable order; may be called any number of times
    pub fn iter(&self) -> std::slice::Iter<'_, Scenario> {
        self.scenarios.iter()
    }

    /// Number of scenarios
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Whether the matrix is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Highest handset ordinal the matrix requires
    #[must_use]
    pub fn max_handset_index(&self) -> Option<usize> {
        self.scenarios.iter().map(|s| s.handset_index).max()
    }

    /// Highest plan ordinal the matrix requires
    #[must_use]
    pub fn max_plan_index(&self) -> Option<usize> {
        self.scenarios.iter().map(|s| s.plan_index).max()
    }
}

impl<'a> IntoIterator for &'a ScenarioMatrix {
    type Item = &'a Scenario;
    type IntoIter = std::slice::Iter<'a, Scenario>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
