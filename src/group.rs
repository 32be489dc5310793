//! Group (C5): an equivalence class of logically equivalent
//! multi-expressions, its shared logical properties, its winners cache,
//! and its cost lower bound.

use crate::cost::Cost;
use crate::expression::MultiExpression;
use crate::properties::{LogicalProperties, PhysicalProperties};
use crate::search_space::GroupId;

/// Best plan found so far for a `(group, required physical properties)`
/// key, or a negative cache entry recording that the properties cannot be
/// met below the cost bound that was searched.
#[derive(Clone, Debug)]
pub struct Winner {
    /// `None` for a negative cache entry.
    pub plan: Option<usize>,
    pub required_properties: PhysicalProperties,
    pub cost: Cost,
    pub ready: bool,
}

pub struct Group {
    pub id: GroupId,
    /// Logical multi-expressions, including element/constant members,
    /// insertion order preserved. `logical[0]` is the seed used to
    /// initialize this group's properties.
    pub logical: Vec<MultiExpression>,
    /// Physical multi-expressions produced by implementation rules.
    pub physical: Vec<MultiExpression>,
    pub properties: LogicalProperties,
    /// `2^(#tables) * 2.5` for join groups, else 0; used by the task
    /// engine to prioritize cheaper subtrees first.
    pub estimated_size: f64,
    pub lower_bound: Cost,
    /// A list, not a map: `PhysicalProperties`'s wildcard equality can't
    /// satisfy a `HashMap`'s hash/eq contract (see Open Question 2 in
    /// DESIGN.md), so winners are found by linear scan with `eq`.
    winners: Vec<Winner>,
    pub optimized: bool,
    pub explored: bool,
    pub exploring: bool,
    pub changed: bool,
}

impl Group {
    pub fn new(id: GroupId, seed: MultiExpression, properties: LogicalProperties) -> Self {
        Self {
            id,
            logical: vec![seed],
            physical: vec![],
            properties,
            estimated_size: 0.0,
            lower_bound: Cost::zero(),
            winners: Vec::new(),
            optimized: false,
            explored: false,
            exploring: false,
            changed: false,
        }
    }

    pub fn seed(&self) -> &MultiExpression {
        &self.logical[0]
    }

    /// Find the existing winner entry for the given required properties,
    /// if any (invariant 4: at most one per key).
    pub fn find_winner(&self, required: &PhysicalProperties) -> Option<&Winner> {
        self.winners.iter().find(|w| &w.required_properties == required)
    }

    fn find_winner_mut(&mut self, required: &PhysicalProperties) -> Option<&mut Winner> {
        self.winners
            .iter_mut()
            .find(|w| &w.required_properties == required)
    }

    /// Publish a winner for `required`, replacing any existing entry only
    /// if the new cost is strictly lower (winner monotonicity, invariant
    /// 5 / §8 "winner monotonicity"). Returns whether a replacement (or
    /// first insertion) happened.
    pub fn publish_winner(
        &mut self,
        required: PhysicalProperties,
        plan: Option<usize>,
        cost: Cost,
        ready: bool,
    ) -> bool {
        if let Some(existing) = self.find_winner_mut(&required) {
            let should_replace = match (existing.cost.is_infinite(), cost.is_infinite()) {
                (true, true) => false,
                (true, false) => true,
                (false, true) => false,
                (false, false) => cost.total() < existing.cost.total(),
            };
            if should_replace {
                existing.plan = plan;
                existing.cost = cost;
                existing.ready = ready;
                return true;
            }
            if !existing.ready && ready {
                existing.ready = ready;
            }
            return false;
        }
        self.winners.push(Winner {
            plan,
            required_properties: required,
            cost,
            ready,
        });
        true
    }

    pub fn winners(&self) -> &[Winner] {
        &self.winners
    }

    /// Drop every recorded winner for this group (see
    /// [`crate::search_space::SearchSpace::clear_winners`]).
    pub fn clear_winners(&mut self) {
        self.winners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{LogicalOp, Operator};

    fn dummy_group() -> Group {
        let seed = MultiExpression::new(
            Operator::Logical(LogicalOp::GetTable(1)),
            vec![],
            GroupId(0),
        );
        Group::new(
            GroupId(0),
            seed,
            LogicalProperties::Collection {
                schema: Default::default(),
                cardinality: 1.0,
                unique_cardinality: 1.0,
                per_column_statistics: vec![],
                is_base_table: true,
            },
        )
    }

    #[test]
    fn winner_replaced_only_when_strictly_cheaper() {
        let mut g = dummy_group();
        let req = PhysicalProperties::any();
        assert!(g.publish_winner(req.clone(), Some(1), Cost::finite(1.0, 0.0), true));
        assert!(!g.publish_winner(req.clone(), Some(2), Cost::finite(1.0, 0.0), true));
        assert!(g.publish_winner(req.clone(), Some(3), Cost::finite(0.5, 0.0), true));
        assert_eq!(g.find_winner(&req).unwrap().plan, Some(3));
    }

    #[test]
    fn negative_cache_entry_has_no_plan() {
        let mut g = dummy_group();
        let req = PhysicalProperties::sorted(vec![1]);
        g.publish_winner(req.clone(), None, Cost::Infinite, true);
        let winner = g.find_winner(&req).unwrap();
        assert!(winner.plan.is_none());
        assert!(winner.ready);
    }
}
