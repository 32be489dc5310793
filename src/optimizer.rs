//! The public optimizer facade: wires the search space, rule registry,
//! and task engine together behind `optimize`/`explain`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::Catalog;
use crate::cost::Cost;
use crate::expression::Expression;
use crate::extractor::{self, ExplainedExpression};
use crate::properties::PhysicalProperties;
use crate::rules::RuleSet;
use crate::search_space::SearchSpace;
use crate::tasks::{self, OptCtx, OptimizeGroup, Task};

/// Tunables for the search (ambient config, not part of the operator
/// algebra or cost formulas themselves).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Global epsilon-pruning slack: a branch is only pruned once its
    /// partial cost exceeds `cost_limit * (1 + epsilon)`, so plans within
    /// `epsilon` of optimal are still considered equally good.
    pub epsilon: f64,
    /// Whether a group's lower bound is checked against the active cost
    /// limit before its expressions are expanded.
    pub group_pruning: bool,
    /// Whether base-table column unique-cardinality feeds into group
    /// lower bounds (tighter bounds, extra bookkeeping per insert).
    pub column_uc_pruning: bool,
    /// Rule indices (matching `RuleSet::standard()`'s stable ordering)
    /// that are skipped regardless of whether their pattern matches.
    /// Analogous to the teacher's `CascadesOptimizer::disable_rule` /
    /// `enable_rule`, useful for tests that need to pin a specific
    /// physical operator by ruling out its competitors.
    pub disabled_rules: HashSet<usize>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            group_pruning: true,
            column_uc_pruning: true,
            disabled_rules: HashSet::new(),
        }
    }
}

impl OptimizerSettings {
    pub fn disable_rule(&mut self, rule_index: usize) {
        self.disabled_rules.insert(rule_index);
    }

    pub fn enable_rule(&mut self, rule_index: usize) {
        self.disabled_rules.remove(&rule_index);
    }
}

/// Counters surfaced alongside `explain()` for understanding how much
/// work a search did.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OptimizerDiagnostics {
    pub tasks_executed: u64,
    pub rules_fired: u64,
    pub winners_published: u64,
    pub pruned: u64,
    pub groups_created: u64,
}

pub struct Optimizer {
    catalog: Arc<dyn Catalog>,
    settings: OptimizerSettings,
}

impl Optimizer {
    pub fn new(catalog: Arc<dyn Catalog>, settings: OptimizerSettings) -> Self {
        Self { catalog, settings }
    }

    /// Optimize `root`, returning the winning physical plan with no
    /// required output properties beyond "any".
    pub fn optimize(&self, root: &Expression) -> Result<Expression> {
        let (mut search_space, root_group) = self.search(root)?.0;
        extractor::extract_plan(&mut search_space, root_group, &PhysicalProperties::any())
    }

    /// Optimize `root` and return the winning plan annotated with
    /// per-node cost/cardinality, plus counters describing the search.
    pub fn explain(&self, root: &Expression) -> Result<(ExplainedExpression, OptimizerDiagnostics)> {
        let ((mut search_space, root_group), diagnostics) = self.search(root)?;
        let plan = extractor::extract(&mut search_space, root_group, &PhysicalProperties::any())?;
        Ok((plan, diagnostics))
    }

    fn search(
        &self,
        root: &Expression,
    ) -> Result<((SearchSpace, crate::search_space::GroupId), OptimizerDiagnostics)> {
        let mut search_space = SearchSpace::new(self.catalog.clone(), self.settings.column_uc_pruning);
        let root_group = search_space.insert(root, None)?;

        let rules = RuleSet::standard();
        let mut diagnostics = OptimizerDiagnostics::default();
        let required = PhysicalProperties::any();

        {
            let mut ctx = OptCtx {
                search_space: &mut search_space,
                rules: &rules,
                catalog: self.catalog.as_ref(),
                settings: &self.settings,
                diagnostics: &mut diagnostics,
            };
            let mut stack: Vec<Box<dyn Task>> = vec![Box::new(OptimizeGroup {
                group: root_group,
                required,
                cost_limit: Cost::Infinite,
            })];
            tasks::run(&mut stack, &mut ctx)?;
        }

        diagnostics.groups_created = search_space.all_group_ids().len() as u64;

        info!(
            tasks_executed = diagnostics.tasks_executed,
            rules_fired = diagnostics.rules_fired,
            winners_published = diagnostics.winners_published,
            pruned = diagnostics.pruned,
            groups_created = diagnostics.groups_created,
            "search complete"
        );

        Ok(((search_space, root_group), diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, InMemoryCatalog, TableDescriptor};
    use crate::operator::{CompareOp, ElementOp, LogicalOp, Operator};
    use crate::schema::{Column, DataType};

    fn catalog_with_one_table() -> Arc<dyn Catalog> {
        let mut catalog = InMemoryCatalog::new(4096);
        catalog.add_table(TableDescriptor {
            id: 1,
            name: "widgets".into(),
            columns: vec![ColumnDescriptor {
                id: 0,
                column: Column::from_table(1, "id", DataType::Int),
                unique_cardinality: 1000.0,
            }],
            cardinality: 1000.0,
            pages: 10,
            indexes: vec![],
        });
        Arc::new(catalog)
    }

    #[test]
    fn optimizes_a_bare_table_scan() {
        let catalog = catalog_with_one_table();
        let optimizer = Optimizer::new(catalog, OptimizerSettings::default());
        let root = Expression::leaf(Operator::Logical(LogicalOp::GetTable(1))).unwrap();
        let plan = optimizer.optimize(&root).unwrap();
        match plan {
            Expression::New { operator, children } => {
                assert!(matches!(operator, Operator::Physical(crate::operator::PhysicalOp::FileScan(1))));
                assert!(children.is_empty());
            }
            Expression::Ref(_) => panic!("expected a materialized node"),
        }
    }

    #[test]
    fn optimizes_a_selection_over_a_scan() {
        let catalog = catalog_with_one_table();
        let optimizer = Optimizer::new(catalog, OptimizerSettings::default());
        let table = Expression::leaf(Operator::Logical(LogicalOp::GetTable(1))).unwrap();
        let predicate = Expression::new(
            Operator::Element(ElementOp::Compare(CompareOp::Eq)),
            vec![
                Expression::leaf(Operator::Element(ElementOp::GetColumn(0))).unwrap(),
                Expression::leaf(Operator::Element(ElementOp::Constant(
                    crate::operator::ConstantValue::Int(1),
                )))
                .unwrap(),
            ],
        )
        .unwrap();
        let select = Expression::new(Operator::Logical(LogicalOp::Select), vec![table, predicate]).unwrap();
        let (plan, diagnostics) = optimizer.explain(&select).unwrap();
        assert!(!plan.cost.is_infinite());
        assert!(diagnostics.winners_published > 0);
    }
}
