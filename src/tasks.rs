//! The task engine (C8): five task kinds driving a goal-directed,
//! branch-and-bound search over the memo. Each task's `execute` returns
//! its own follow-up work rather than pushing directly onto a shared
//! stack, so a task never reaches past its own scope to mutate engine
//! state it doesn't own; a separate driver loop owns the actual LIFO
//! stack and pushes whatever continuations come back.

use anyhow::Result;
use tracing::trace;

use crate::catalog::Catalog;
use crate::cost::{self, Cost};
use crate::expression::MultiExpression;
use crate::operator::{Operator, PhysicalOp};
use crate::optimizer::{OptimizerDiagnostics, OptimizerSettings};
use crate::properties::{Order, PhysicalProperties};
use crate::rules::{Binding, Rule, RuleSet};
use crate::search_space::{GroupId, SearchSpace};

pub struct OptCtx<'a> {
    pub search_space: &'a mut SearchSpace,
    pub rules: &'a RuleSet,
    pub catalog: &'a dyn Catalog,
    pub settings: &'a OptimizerSettings,
    pub diagnostics: &'a mut OptimizerDiagnostics,
}

pub trait Task {
    fn execute(&self, ctx: &mut OptCtx) -> Result<Vec<Box<dyn Task>>>;
    fn name(&self) -> &'static str;
}

/// Drive the task stack to completion. Owns the single LIFO stack every
/// task's continuations are pushed onto.
pub fn run(stack: &mut Vec<Box<dyn Task>>, ctx: &mut OptCtx) -> Result<()> {
    while let Some(task) = stack.pop() {
        trace!(event = "task_begin", task = task.name());
        let continuations = task.execute(ctx)?;
        ctx.diagnostics.tasks_executed += 1;
        trace!(event = "task_finish", task = task.name(), continuations = continuations.len());
        stack.extend(continuations);
    }
    Ok(())
}

pub struct OptimizeGroup {
    pub group: GroupId,
    pub required: PhysicalProperties,
    pub cost_limit: Cost,
}

impl Task for OptimizeGroup {
    fn name(&self) -> &'static str {
        "OptimizeGroup"
    }

    fn execute(&self, ctx: &mut OptCtx) -> Result<Vec<Box<dyn Task>>> {
        let group_id = ctx.search_space.resolve(self.group);

        // A group a `merge_groups` absorbed into since its last winner was
        // published may now have a cheaper member; force re-derivation even
        // past an already-ready winner.
        let reopened = ctx.search_space.group(group_id).changed;
        if reopened {
            ctx.search_space.group_mut(group_id).changed = false;
            ctx.search_space.group_mut(group_id).optimized = false;
        } else {
            if let Some(winner) = ctx.search_space.group(group_id).find_winner(&self.required) {
                if winner.ready {
                    return Ok(vec![]);
                }
            }
            // The root call optimizes under `any()`; once that fan-out has
            // run once for this group and nothing has changed since, a
            // repeat `OptimizeGroup{any}` (pushed while waiting on a
            // sibling, say) has nothing new to contribute.
            if self.required.is_any() && ctx.search_space.group(group_id).optimized {
                return Ok(vec![]);
            }
        }

        if ctx.settings.group_pruning && !self.cost_limit.is_infinite() {
            let lower_bound = ctx.search_space.group(group_id).lower_bound;
            if !lower_bound.is_infinite() && lower_bound.total() > self.cost_limit.total() {
                trace!(event = "task_skip", task = self.name(), reason = "group_lower_bound_exceeds_limit");
                ctx.search_space
                    .group_mut(group_id)
                    .publish_winner(self.required.clone(), None, Cost::Infinite, true);
                return Ok(vec![]);
            }
        }

        let mut tasks: Vec<Box<dyn Task>> = Vec::new();

        if !ctx.search_space.group(group_id).explored && !ctx.search_space.group(group_id).exploring {
            ctx.search_space.group_mut(group_id).exploring = true;
            tasks.push(Box::new(ExploreGroup { group: group_id }));
        }

        let logical_count = ctx.search_space.group(group_id).logical.len();
        for idx in 0..logical_count {
            tasks.push(Box::new(OptimizeExpression {
                group: group_id,
                expr_index: idx,
                required: self.required.clone(),
                cost_limit: self.cost_limit,
                transformation_only: false,
            }));
        }

        let physical_count = ctx.search_space.group(group_id).physical.len();
        for idx in 0..physical_count {
            tasks.push(Box::new(OptimizeInputs {
                group: group_id,
                expr_index: idx,
                required: self.required.clone(),
                cost_limit: self.cost_limit,
                next_child: 0,
            }));
        }

        if let (Order::Sorted, Some(key)) = (self.required.order, &self.required.ordering_key) {
            let already_enforced = ctx.search_space.group(group_id).physical.iter().any(|m| {
                matches!(&m.operator, Operator::Physical(PhysicalOp::Sort(k)) if k == key)
            });
            if !already_enforced {
                let enforcer =
                    MultiExpression::new(Operator::Physical(PhysicalOp::Sort(key.clone())), vec![group_id], group_id);
                ctx.search_space.group_mut(group_id).physical.push(enforcer);
                let idx = ctx.search_space.group(group_id).physical.len() - 1;
                tasks.push(Box::new(OptimizeInputs {
                    group: group_id,
                    expr_index: idx,
                    required: self.required.clone(),
                    cost_limit: self.cost_limit,
                    next_child: 0,
                }));
            }
        }

        if self.required.is_any() {
            ctx.search_space.group_mut(group_id).optimized = true;
        }

        Ok(tasks)
    }
}

pub struct ExploreGroup {
    pub group: GroupId,
}

impl Task for ExploreGroup {
    fn name(&self) -> &'static str {
        "ExploreGroup"
    }

    fn execute(&self, ctx: &mut OptCtx) -> Result<Vec<Box<dyn Task>>> {
        let group_id = ctx.search_space.resolve(self.group);
        if ctx.search_space.group(group_id).explored {
            return Ok(vec![]);
        }
        ctx.search_space.group_mut(group_id).explored = true;
        ctx.search_space.group_mut(group_id).exploring = false;

        let logical_count = ctx.search_space.group(group_id).logical.len();
        let tasks = (0..logical_count)
            .map(|idx| {
                Box::new(OptimizeExpression {
                    group: group_id,
                    expr_index: idx,
                    required: PhysicalProperties::any(),
                    cost_limit: Cost::Infinite,
                    transformation_only: true,
                }) as Box<dyn Task>
            })
            .collect();
        Ok(tasks)
    }
}

pub struct OptimizeExpression {
    pub group: GroupId,
    pub expr_index: usize,
    pub required: PhysicalProperties,
    pub cost_limit: Cost,
    pub transformation_only: bool,
}

impl Task for OptimizeExpression {
    fn name(&self) -> &'static str {
        "OptimizeExpression"
    }

    fn execute(&self, ctx: &mut OptCtx) -> Result<Vec<Box<dyn Task>>> {
        let group_id = ctx.search_space.resolve(self.group);
        if self.expr_index >= ctx.search_space.group(group_id).logical.len() {
            return Ok(vec![]);
        }

        let mexpr = ctx.search_space.group(group_id).logical[self.expr_index].clone();
        let mut candidates: Vec<(usize, f64)> = Vec::new();
        for (rule_index, rule) in ctx.rules.iter() {
            if ctx.settings.disabled_rules.contains(&rule_index) {
                continue;
            }
            if self.transformation_only && !rule.is_transformation() {
                continue;
            }
            if !mexpr.can_fire(rule_index) || !rule.pattern().matches(&mexpr.operator) {
                continue;
            }
            let binding = Binding {
                mexpr: &mexpr,
                group: group_id,
                search_space: &*ctx.search_space,
                catalog: ctx.catalog,
            };
            let promise = rule.promise(&binding);
            if promise <= 0.0 {
                trace!(event = "rule_skipped", rule = rule.name(), group = %group_id, reason = "non_positive_promise");
                continue;
            }
            candidates.push((rule_index, promise));
        }

        // Ascending: the driver's stack is LIFO, so the last entry pushed
        // pops first -- sorting ascending by promise makes the highest-
        // promise rule fire first (C7).
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let tasks = candidates
            .into_iter()
            .map(|(rule_index, _)| {
                Box::new(ApplyRule {
                    group: group_id,
                    expr_index: self.expr_index,
                    rule_index,
                    required: self.required.clone(),
                    cost_limit: self.cost_limit,
                }) as Box<dyn Task>
            })
            .collect();
        Ok(tasks)
    }
}

pub struct ApplyRule {
    pub group: GroupId,
    pub expr_index: usize,
    pub rule_index: usize,
    pub required: PhysicalProperties,
    pub cost_limit: Cost,
}

impl Task for ApplyRule {
    fn name(&self) -> &'static str {
        "ApplyRule"
    }

    fn execute(&self, ctx: &mut OptCtx) -> Result<Vec<Box<dyn Task>>> {
        let group_id = ctx.search_space.resolve(self.group);
        if self.expr_index >= ctx.search_space.group(group_id).logical.len() {
            return Ok(vec![]);
        }
        if !ctx.search_space.group(group_id).logical[self.expr_index].can_fire(self.rule_index) {
            return Ok(vec![]);
        }

        let rule = ctx.rules.get(self.rule_index);
        let mexpr = ctx.search_space.group(group_id).logical[self.expr_index].clone();
        let results = {
            let binding = Binding {
                mexpr: &mexpr,
                group: group_id,
                search_space: &*ctx.search_space,
                catalog: ctx.catalog,
            };
            rule.apply(&binding)?
        };

        ctx.search_space.group_mut(group_id).logical[self.expr_index].mark_fired(self.rule_index);
        ctx.diagnostics.rules_fired += 1;
        trace!(event = "rule_fired", rule = rule.name(), group = %group_id, produced = results.len());

        let mut tasks: Vec<Box<dyn Task>> = Vec::new();
        for result in results {
            let before_logical = ctx.search_space.group(group_id).logical.len();
            let before_physical = ctx.search_space.group(group_id).physical.len();
            let result_group = ctx.search_space.insert(&result, Some(group_id))?;
            let result_group = ctx.search_space.resolve(result_group);

            if rule.is_transformation() {
                if result_group == group_id {
                    let after_logical = ctx.search_space.group(result_group).logical.len();
                    for idx in before_logical..after_logical {
                        tasks.push(Box::new(OptimizeExpression {
                            group: result_group,
                            expr_index: idx,
                            required: self.required.clone(),
                            cost_limit: self.cost_limit,
                            transformation_only: false,
                        }));
                    }
                }
            } else {
                let after_physical = ctx.search_space.group(result_group).physical.len();
                for idx in before_physical..after_physical {
                    tasks.push(Box::new(OptimizeInputs {
                        group: result_group,
                        expr_index: idx,
                        required: self.required.clone(),
                        cost_limit: self.cost_limit,
                        next_child: 0,
                    }));
                }
            }
        }
        Ok(tasks)
    }
}

pub struct OptimizeInputs {
    pub group: GroupId,
    pub expr_index: usize,
    pub required: PhysicalProperties,
    pub cost_limit: Cost,
    pub next_child: usize,
}

impl Task for OptimizeInputs {
    fn name(&self) -> &'static str {
        "OptimizeInputs"
    }

    fn execute(&self, ctx: &mut OptCtx) -> Result<Vec<Box<dyn Task>>> {
        let group_id = ctx.search_space.resolve(self.group);
        if self.expr_index >= ctx.search_space.group(group_id).physical.len() {
            return Ok(vec![]);
        }
        let mexpr = ctx.search_space.group(group_id).physical[self.expr_index].clone();
        let children: Vec<GroupId> = mexpr
            .children
            .iter()
            .map(|&c| ctx.search_space.resolve(c))
            .collect();

        // Per-child requirements this operator needs of each input to
        // deliver `self.required` itself (§4.1/§4.6); `None` means this
        // multi-expression can never satisfy `self.required` at all.
        let Some(child_required) = mexpr.operator.satisfy_required_properties(&self.required) else {
            trace!(event = "task_skip", task = self.name(), reason = "required_properties_infeasible");
            return Ok(vec![]);
        };
        anyhow::ensure!(
            child_required.len() == children.len(),
            "satisfy_required_properties returned {} requirements for {} children",
            child_required.len(),
            children.len()
        );

        if self.next_child < children.len() {
            let child = children[self.next_child];
            let required_for_child = child_required[self.next_child].clone();

            // Element children (predicates, projection lists) never get a
            // physical winner -- skip straight to the next child.
            if is_element_group(ctx.search_space, child) {
                return Ok(vec![Box::new(OptimizeInputs {
                    group: self.group,
                    expr_index: self.expr_index,
                    required: self.required.clone(),
                    cost_limit: self.cost_limit,
                    next_child: self.next_child + 1,
                })]);
            }

            let ready = ctx
                .search_space
                .group(child)
                .find_winner(&required_for_child)
                .map(|w| w.ready)
                .unwrap_or(false);
            if ready {
                return Ok(vec![Box::new(OptimizeInputs {
                    group: self.group,
                    expr_index: self.expr_index,
                    required: self.required.clone(),
                    cost_limit: self.cost_limit,
                    next_child: self.next_child + 1,
                })]);
            }
            trace!(event = "task_yield", task = self.name(), waiting_on = %child);
            return Ok(vec![
                Box::new(OptimizeGroup {
                    group: child,
                    required: required_for_child,
                    cost_limit: self.cost_limit,
                }),
                Box::new(OptimizeInputs {
                    group: self.group,
                    expr_index: self.expr_index,
                    required: self.required.clone(),
                    cost_limit: self.cost_limit,
                    next_child: self.next_child,
                }),
            ]);
        }

        let mut total = local_cost(ctx, group_id, &mexpr)?;
        for (&child, required_for_child) in children.iter().zip(&child_required) {
            if is_element_group(ctx.search_space, child) {
                continue;
            }
            let winner = ctx
                .search_space
                .group(child)
                .find_winner(required_for_child)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("child winner missing after optimization"))?;
            if winner.cost.is_infinite() {
                total = Cost::Infinite;
                break;
            }
            total = total + winner.cost;
        }

        let over_budget = !self.cost_limit.is_infinite()
            && !total.is_infinite()
            && total.total() > self.cost_limit.total() * (1.0 + ctx.settings.epsilon);

        if total.is_infinite() || over_budget {
            ctx.diagnostics.pruned += 1;
            trace!(event = "task_skip", task = self.name(), reason = "cost_exceeds_limit");
            return Ok(vec![]);
        }

        ctx.search_space
            .group_mut(group_id)
            .publish_winner(self.required.clone(), Some(self.expr_index), total, true);
        ctx.diagnostics.winners_published += 1;
        Ok(vec![])
    }
}

fn local_cost(ctx: &OptCtx, group_id: GroupId, mexpr: &MultiExpression) -> Result<Cost> {
    let group = ctx.search_space.group(group_id);
    let cardinality = group.properties.cardinality().max(1.0);
    Ok(match &mexpr.operator {
        Operator::Physical(PhysicalOp::FileScan(table_id)) => {
            let table = ctx.catalog.lookup_table_by_id(*table_id)?;
            Cost::finite(
                table.pages as f64 * cost::SEQUENTIAL_IO,
                table.cardinality * cost::CPU_READ,
            )
        }
        Operator::Physical(PhysicalOp::IdxFilter(_, _)) => {
            Cost::finite(cardinality * cost::INDEX_PROBE, cardinality * cost::CPU_READ)
        }
        Operator::Physical(PhysicalOp::Filter) => Cost::finite(0.0, cardinality * cost::PREDICATE),
        Operator::Physical(PhysicalOp::Truncate(_)) => Cost::finite(0.0, cardinality * cost::CPU_READ),
        Operator::Physical(
            PhysicalOp::NLJoin
            | PhysicalOp::BlockNLJoin
            | PhysicalOp::IdxNLJoin
            | PhysicalOp::GJoin
            | PhysicalOp::BitmapIdxJoin,
        ) => Cost::finite(0.0, cardinality * cost::COMPARE_MOVE),
        Operator::Physical(PhysicalOp::MergeJoin(_)) => Cost::finite(0.0, cardinality * cost::COMPARE_MOVE),
        Operator::Physical(PhysicalOp::HashJoin | PhysicalOp::HybridHashJoin) => {
            Cost::finite(0.0, cardinality * (cost::HASH_PROBE + cost::HASH_COST))
        }
        Operator::Physical(PhysicalOp::HashDuplicates | PhysicalOp::HashAggregate) => {
            Cost::finite(0.0, cardinality * cost::HASH_COST)
        }
        Operator::Physical(PhysicalOp::SortAggregate(_) | PhysicalOp::Sort(_)) => {
            let log_factor = cardinality.log2().max(1.0);
            Cost::finite(0.0, cardinality * log_factor * cost::COMPARE_MOVE)
        }
    })
}

/// Predicates, projection lists, and aggregation function applications
/// (`Operator::Element`) never acquire a physical winner -- no
/// implementation rule's pattern matches them -- so they're treated as
/// zero-cost and perpetually ready wherever a physical operator's child.
fn is_element_group(search_space: &SearchSpace, group: GroupId) -> bool {
    matches!(
        search_space.group(group).properties,
        crate::properties::LogicalProperties::Element { .. }
    )
}
