//! The rule system (C7): transformation rules (logical to logical, may
//! create or merge groups) and implementation rules (logical to
//! physical, same group), dispatched through a registry that assigns
//! each rule a stable index matching the bit position it occupies in
//! [`crate::expression::MultiExpression`]'s `fired_rules` mask.

mod implementation;
mod transformation;

use anyhow::Result;

use crate::catalog::Catalog;
use crate::expression::{Expression, MultiExpression};
use crate::operator::Operator;
use crate::search_space::{GroupId, SearchSpace};

/// A cheap top-level check a rule uses to skip multi-expressions it
/// clearly cannot apply to, before the more detailed [`Rule::apply`]
/// logic runs.
#[derive(Clone, Copy)]
pub struct Pattern(pub fn(&Operator) -> bool);

impl Pattern {
    pub fn matches(&self, operator: &Operator) -> bool {
        (self.0)(operator)
    }
}

/// Everything a rule needs to inspect the multi-expression it was fired
/// on and its surrounding group structure.
pub struct Binding<'a> {
    pub mexpr: &'a MultiExpression,
    pub group: GroupId,
    pub search_space: &'a SearchSpace,
    pub catalog: &'a dyn Catalog,
}

pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    /// `true`: logical -> logical (output inserted into `binding.group`,
    /// duplicate/equivalent detection may merge groups).
    /// `false`: logical -> physical (output inserted into `binding.group`
    /// as a physical multi-expression).
    fn is_transformation(&self) -> bool;
    fn pattern(&self) -> Pattern;
    /// Candidate replacement expressions, or an empty vec if the rule's
    /// deeper preconditions (beyond the top-level pattern) don't hold.
    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>>;

    /// How eagerly the task engine should fire this rule for `binding`
    /// relative to the other rules pending on the same multi-expression
    /// (C7): non-positive skips firing it entirely, higher fires first.
    /// Most rules have no opinion and take the neutral default.
    fn promise(&self, _binding: &Binding) -> f64 {
        1.0
    }
}

pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// The full catalog of rules this optimizer knows, in a fixed order
    /// so that rule index == bit position is stable across a run.
    pub fn standard() -> Self {
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(transformation::JoinCommute),
            Box::new(transformation::SelectPushBelowProject),
            Box::new(transformation::EliminateTrivialProject),
            Box::new(implementation::GetTableToFileScan),
            Box::new(implementation::SelectToFilter),
            Box::new(implementation::SelectToIdxFilter),
            Box::new(implementation::EqJoinToNLJoin),
            Box::new(implementation::EqJoinToHashJoin),
            Box::new(implementation::EqJoinToMergeJoin),
            Box::new(implementation::DistinctToHashDuplicates),
            Box::new(implementation::AggregateToHashAggregate),
            Box::new(implementation::AggregateToSortAggregate),
            Box::new(implementation::OrderByToEnforcedSort),
            Box::new(implementation::ProjectToTruncate),
        ];
        assert!(rules.len() <= 64, "rule count exceeds the fired_rules bit-mask width");
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> &dyn Rule {
        self.rules[index].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &dyn Rule)> {
        self.rules.iter().enumerate().map(|(i, r)| (i, r.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_rule_set_has_stable_indices() {
        let rules = RuleSet::standard();
        assert_eq!(rules.get(0).name(), "join_commute");
        assert!(rules.len() <= 64);
    }
}
