//! Implementation rules: logical to physical, same group. Each picks one
//! concrete access method or algorithm for a logical operator.

use anyhow::Result;

use crate::catalog::IndexKind;
use crate::expression::Expression;
use crate::operator::{LogicalOp, Operator, PhysicalOp};

use super::{Binding, Pattern, Rule};

pub struct GetTableToFileScan;

impl Rule for GetTableToFileScan {
    fn name(&self) -> &'static str {
        "get_table_to_file_scan"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::GetTable(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::GetTable(table_id)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        Ok(vec![Expression::leaf(Operator::Physical(
            PhysicalOp::FileScan(*table_id),
        ))?])
    }
}

pub struct SelectToFilter;

impl Rule for SelectToFilter {
    fn name(&self) -> &'static str {
        "select_to_filter"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Select)))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let input = binding.mexpr.children[0];
        let predicate = binding.mexpr.children[1];
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::Filter),
            vec![Expression::group_ref(input), Expression::group_ref(predicate)],
        )?])
    }
}

/// Only fires when the input is a base table with at least one index
/// registered in the catalog; otherwise there's nothing to probe.
pub struct SelectToIdxFilter;

impl Rule for SelectToIdxFilter {
    fn name(&self) -> &'static str {
        "select_to_idx_filter"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Select)))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let input_group = binding.mexpr.children[0];
        let predicate_group = binding.mexpr.children[1];
        let input = binding.search_space.group(input_group);
        let table_id = match &input.seed().operator {
            Operator::Logical(LogicalOp::GetTable(id)) => *id,
            _ => return Ok(vec![]),
        };
        let indexes = binding.catalog.indexes_of(table_id);
        if indexes.is_empty() {
            return Ok(vec![]);
        }
        // Prefer a BTree index: it hands rows back in `sort_key` order, so
        // an `OrderBy`/`MergeJoin` above this scan might not need a `Sort`
        // enforcer at all. A Bitmap-only table can still be probed, just
        // without an order guarantee.
        let sort_key = indexes
            .iter()
            .find(|idx| idx.kind == IndexKind::BTree)
            .map(|idx| idx.sort_key.clone());
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::IdxFilter(table_id, sort_key)),
            vec![Expression::group_ref(predicate_group)],
        )?])
    }
}

fn eqjoin_children(binding: &Binding) -> (crate::search_space::GroupId, crate::search_space::GroupId) {
    (binding.mexpr.children[0], binding.mexpr.children[1])
}

pub struct EqJoinToNLJoin;

impl Rule for EqJoinToNLJoin {
    fn name(&self) -> &'static str {
        "eqjoin_to_nljoin"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::EqJoin(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let (left, right) = eqjoin_children(binding);
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::NLJoin),
            vec![Expression::group_ref(left), Expression::group_ref(right)],
        )?])
    }
}

pub struct EqJoinToHashJoin;

impl Rule for EqJoinToHashJoin {
    fn name(&self) -> &'static str {
        "eqjoin_to_hashjoin"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::EqJoin(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let (left, right) = eqjoin_children(binding);
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::HashJoin),
            vec![Expression::group_ref(left), Expression::group_ref(right)],
        )?])
    }
}

pub struct EqJoinToMergeJoin;

impl Rule for EqJoinToMergeJoin {
    fn name(&self) -> &'static str {
        "eqjoin_to_mergejoin"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::EqJoin(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::EqJoin(pairs)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let (left, right) = eqjoin_children(binding);
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::MergeJoin(pairs.clone())),
            vec![Expression::group_ref(left), Expression::group_ref(right)],
        )?])
    }
}

pub struct DistinctToHashDuplicates;

impl Rule for DistinctToHashDuplicates {
    fn name(&self) -> &'static str {
        "distinct_to_hash_duplicates"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Distinct)))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let input = binding.mexpr.children[0];
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::HashDuplicates),
            vec![Expression::group_ref(input)],
        )?])
    }
}

pub struct AggregateToHashAggregate;

impl Rule for AggregateToHashAggregate {
    fn name(&self) -> &'static str {
        "aggregate_to_hash_aggregate"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Aggregate { .. })))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let input = binding.mexpr.children[0];
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::HashAggregate),
            vec![Expression::group_ref(input)],
        )?])
    }
}

pub struct AggregateToSortAggregate;

impl Rule for AggregateToSortAggregate {
    fn name(&self) -> &'static str {
        "aggregate_to_sort_aggregate"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Aggregate { .. })))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::Aggregate { group_by, .. }) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let input = binding.mexpr.children[0];
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::SortAggregate(group_by.clone())),
            vec![Expression::group_ref(input)],
        )?])
    }
}

/// Implements `OrderBy` with an explicit `Sort` enforcer node rather than
/// relying on an input that already happens to be sorted; the task
/// engine's enforcer insertion (§4.5) handles the case where a cheaper
/// already-sorted child makes this redundant.
pub struct OrderByToEnforcedSort;

impl Rule for OrderByToEnforcedSort {
    fn name(&self) -> &'static str {
        "order_by_to_enforced_sort"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::OrderBy(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::OrderBy(cols)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let input = binding.mexpr.children[0];
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::Sort(cols.clone())),
            vec![Expression::group_ref(input)],
        )?])
    }
}

/// The only implementation available for a column-dropping `Project`:
/// `EliminateTrivialProject` already handles the identity case by folding
/// the group away, so whatever reaches here genuinely narrows the schema.
pub struct ProjectToTruncate;

impl Rule for ProjectToTruncate {
    fn name(&self) -> &'static str {
        "project_to_truncate"
    }

    fn is_transformation(&self) -> bool {
        false
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Project(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::Project(cols)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let input = binding.mexpr.children[0];
        Ok(vec![Expression::new(
            Operator::Physical(PhysicalOp::Truncate(cols.clone())),
            vec![Expression::group_ref(input)],
        )?])
    }
}
