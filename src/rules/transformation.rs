//! Transformation rules: logical to logical. Each may introduce a new
//! group for a freshly produced child, or merge two groups together when
//! the result turns out to already be present elsewhere in the memo.

use anyhow::Result;

use crate::expression::Expression;
use crate::operator::{LogicalOp, Operator};

use super::{Binding, Pattern, Rule};

pub struct JoinCommute;

impl Rule for JoinCommute {
    fn name(&self) -> &'static str {
        "join_commute"
    }

    fn is_transformation(&self) -> bool {
        true
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::EqJoin(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::EqJoin(pairs)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let swapped_pairs = pairs.iter().map(|&(l, r)| (r, l)).collect();
        let left = binding.mexpr.children[0];
        let right = binding.mexpr.children[1];
        let swapped = Expression::new(
            Operator::Logical(LogicalOp::EqJoin(swapped_pairs)),
            vec![Expression::group_ref(right), Expression::group_ref(left)],
        )?;
        Ok(vec![swapped])
    }

    /// Size heuristic: when the left input's cardinality already exceeds
    /// the right's, commuting puts the smaller side first, which is the
    /// ordering most of this catalog's join algorithms cost cheapest
    /// (probe side outer). Firing that direction first lets the task
    /// engine's branch-and-bound see a tight bound sooner.
    fn promise(&self, binding: &Binding) -> f64 {
        let left = binding.mexpr.children[0];
        let right = binding.mexpr.children[1];
        let left_card = binding.search_space.group(left).properties.cardinality();
        let right_card = binding.search_space.group(right).properties.cardinality();
        if left_card > right_card {
            2.0
        } else {
            1.0
        }
    }
}

/// `Project(Select(input, pred), cols)` -> `Select(Project(input, cols), pred)`:
/// move a filter below a projection so later rules (and the cost model's
/// size estimates) see the filtered-then-projected form.
pub struct SelectPushBelowProject;

impl Rule for SelectPushBelowProject {
    fn name(&self) -> &'static str {
        "select_push_below_project"
    }

    fn is_transformation(&self) -> bool {
        true
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Project(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::Project(cols)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let input_group = binding.mexpr.children[0];
        let group = binding.search_space.group(input_group);
        let mut out = Vec::new();
        for select_mexpr in &group.logical {
            if matches!(select_mexpr.operator, Operator::Logical(LogicalOp::Select)) {
                let inner_input = select_mexpr.children[0];
                let predicate = select_mexpr.children[1];
                let projected = Expression::new(
                    Operator::Logical(LogicalOp::Project(cols.clone())),
                    vec![Expression::group_ref(inner_input)],
                )?;
                let pushed = Expression::new(
                    Operator::Logical(LogicalOp::Select),
                    vec![projected, Expression::group_ref(predicate)],
                )?;
                out.push(pushed);
            }
        }
        Ok(out)
    }
}

/// A projection onto every input column in order carries no information;
/// fold it away by merging its group with its input's group.
pub struct EliminateTrivialProject;

impl Rule for EliminateTrivialProject {
    fn name(&self) -> &'static str {
        "eliminate_trivial_project"
    }

    fn is_transformation(&self) -> bool {
        true
    }

    fn pattern(&self) -> Pattern {
        Pattern(|op| matches!(op, Operator::Logical(LogicalOp::Project(_))))
    }

    fn apply(&self, binding: &Binding) -> Result<Vec<Expression>> {
        let Operator::Logical(LogicalOp::Project(cols)) = &binding.mexpr.operator else {
            return Ok(vec![]);
        };
        let input_group = binding.mexpr.children[0];
        let props = &binding.search_space.group(input_group).properties;
        let Some((schema, ..)) = props.as_collection() else {
            return Ok(vec![]);
        };
        let identity = cols.len() == schema.columns.len()
            && cols.iter().enumerate().all(|(i, &c)| c as usize == i);
        if identity {
            Ok(vec![Expression::group_ref(input_group)])
        } else {
            Ok(vec![])
        }
    }
}
