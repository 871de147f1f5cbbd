mod lookup;
mod rules;

pub use lookup::match_by_name;

use super::domain::{EligibilityFacts, Scheme};
use serde::{Deserialize, Serialize};

/// Eligibility attribute inspected by a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Age,
    Gender,
    AnnualIncome,
    District,
    Community,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    /// The profile did not carry the attribute, so the rule does not constrain.
    Skipped,
}

/// One rule's verdict, kept so callers can explain exclusions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionCheck {
    pub criterion: Criterion,
    pub outcome: CheckOutcome,
    pub notes: String,
}

/// True when no rule fails. Absent attributes pass.
pub fn evaluate(facts: &EligibilityFacts, scheme: &Scheme) -> bool {
    rules::check_all(facts, scheme)
        .iter()
        .all(|check| check.outcome != CheckOutcome::Failed)
}

/// Per-rule breakdown in a fixed criterion order.
pub fn explain(facts: &EligibilityFacts, scheme: &Scheme) -> Vec<CriterionCheck> {
    rules::check_all(facts, scheme)
}

/// Eligible subset of `schemes`, preserving catalog order.
pub fn filter_eligible(facts: &EligibilityFacts, schemes: &[Scheme]) -> Vec<Scheme> {
    if facts.is_empty() {
        return schemes.to_vec();
    }

    schemes
        .iter()
        .filter(|scheme| evaluate(facts, scheme))
        .cloned()
        .collect()
}
