//! Plan extraction (C9): walk the winners recorded in the search space
//! and materialize a concrete physical plan, either as a plain
//! [`Expression`] tree (for handing to an execution engine) or annotated
//! with per-node cost/cardinality metadata via [`ExplainedExpression`]
//! (for `EXPLAIN`-style diagnostics).

use anyhow::{anyhow, Result};

use crate::cost::Cost;
use crate::expression::Expression;
use crate::operator::Operator;
use crate::properties::{LogicalProperties, PhysicalProperties};
use crate::search_space::{GroupId, SearchSpace};

#[derive(Clone, Debug)]
pub struct ExplainedExpression {
    pub operator: Operator,
    pub children: Vec<ExplainedExpression>,
    pub cost: Cost,
    pub cardinality: f64,
    pub unique_cardinality: f64,
    pub width_bytes: u64,
}

impl ExplainedExpression {
    /// Drop the explain annotations, keeping only the operator tree an
    /// execution engine would consume.
    pub fn to_expression(&self) -> Expression {
        Expression::New {
            operator: self.operator.clone(),
            children: self.children.iter().map(Self::to_expression).collect(),
        }
    }
}

/// Extract the winning plan for `group` under `required`, with full
/// per-node cost and cardinality annotations.
pub fn extract(
    search_space: &mut SearchSpace,
    group: GroupId,
    required: &PhysicalProperties,
) -> Result<ExplainedExpression> {
    let group_id = search_space.resolve(group);

    // Element-shaped groups (predicates, projection lists, aggregation
    // function applications) never carry a physical winner -- no
    // implementation rule's pattern matches `Operator::Element`, so they
    // stay exactly as their logical seed forever. Reconstruct straight
    // from that seed instead of going through the winners cache.
    if matches!(search_space.group(group_id).properties, LogicalProperties::Element { .. }) {
        return extract_element(search_space, group_id);
    }

    let winner = search_space
        .group(group_id)
        .find_winner(required)
        .cloned()
        .ok_or_else(|| anyhow!("no winner recorded for group {group_id} under the requested properties"))?;
    let plan_index = winner
        .plan
        .ok_or_else(|| anyhow!("group {group_id} has no feasible plan under the requested properties"))?;
    let mexpr = search_space.group(group_id).physical[plan_index].clone();

    let child_required = mexpr
        .operator
        .satisfy_required_properties(required)
        .ok_or_else(|| anyhow!("winner for group {group_id} no longer satisfies the requested properties"))?;
    anyhow::ensure!(
        child_required.len() == mexpr.children.len(),
        "satisfy_required_properties returned {} requirements for {} children",
        child_required.len(),
        mexpr.children.len()
    );
    let mut children = Vec::with_capacity(mexpr.children.len());
    for (&child, child_req) in mexpr.children.iter().zip(&child_required) {
        children.push(extract(search_space, child, child_req)?);
    }

    let props = &search_space.group(group_id).properties;
    Ok(ExplainedExpression {
        operator: mexpr.operator.clone(),
        children,
        cost: winner.cost,
        cardinality: props.cardinality(),
        unique_cardinality: props.unique_cardinality(),
        width_bytes: props.schema().map(|s| s.width_bytes()).unwrap_or(0),
    })
}

/// Reconstruct an element-shaped group (no physical winner exists, see
/// above) directly from its logical seed. Element operators carry no
/// execution cost of their own; they're evaluated as part of whatever
/// physical operator consumes them.
fn extract_element(search_space: &mut SearchSpace, group_id: GroupId) -> Result<ExplainedExpression> {
    let mexpr = search_space.group(group_id).seed().clone();
    let mut children = Vec::with_capacity(mexpr.children.len());
    for &child in &mexpr.children {
        children.push(extract_element(search_space, search_space.resolve(child))?);
    }
    let props = &search_space.group(group_id).properties;
    Ok(ExplainedExpression {
        operator: mexpr.operator.clone(),
        children,
        cost: Cost::zero(),
        cardinality: props.cardinality(),
        unique_cardinality: props.unique_cardinality(),
        width_bytes: props.schema().map(|s| s.width_bytes()).unwrap_or(0),
    })
}

/// Extract the winning plan as a plain operator tree, without explain
/// metadata.
pub fn extract_plan(
    search_space: &mut SearchSpace,
    group: GroupId,
    required: &PhysicalProperties,
) -> Result<Expression> {
    Ok(extract(search_space, group, required)?.to_expression())
}
