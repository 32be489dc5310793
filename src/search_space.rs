//! The search space (C6): groups plus a structural hash index over
//! multi-expressions for duplicate/equivalent lookup and group merging.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hasher};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::trace;

use crate::catalog::Catalog;
use crate::expression::{Expression, MultiExpression};
use crate::group::Group;
use crate::operator::{ElementOp, LogicalOp, Operator, PhysicalOp};
use crate::properties::{ColumnStatistics, LogicalProperties};
use crate::schema::Schema;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub usize);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "!{}", self.0)
    }
}

/// `INVALID_ID = -1` reserved (§3 invariant 6); represented here as the
/// absence of any group ever being assigned `usize::MAX`, which this
/// crate simply never hands out, so `GroupId` has no sentinel variant to
/// accidentally collide with a live id.
pub const INVALID_ID: isize = -1;

pub struct SearchSpace {
    groups: Vec<Option<Group>>,
    /// group -> redirect target, path-compressed on lookup. Resolves
    /// Open Question 1: unlike the teacher's acknowledged-incomplete
    /// stub, existing references are redirected through this map rather
    /// than left dangling at the old id.
    merged_into: HashMap<GroupId, GroupId>,
    /// Structural hash index: fingerprint -> candidate multi-expression
    /// locations (group, index within that group's logical list).
    index: HashMap<u64, Vec<(GroupId, usize)>>,
    max_column_unique_cardinality: Vec<(f64, u64)>,
    column_uc_pruning: bool,
    catalog: Arc<dyn Catalog>,
}

impl SearchSpace {
    pub fn new(catalog: Arc<dyn Catalog>, column_uc_pruning: bool) -> Self {
        Self {
            groups: Vec::new(),
            merged_into: HashMap::new(),
            index: HashMap::new(),
            max_column_unique_cardinality: Vec::new(),
            column_uc_pruning,
            catalog,
        }
    }

    /// Resolve a group id to its current (post-merge) representative.
    pub fn resolve(&mut self, mut id: GroupId) -> GroupId {
        let mut path = Vec::new();
        while let Some(&parent) = self.merged_into.get(&id) {
            if parent == id {
                break;
            }
            path.push(id);
            id = parent;
        }
        for node in path {
            self.merged_into.insert(node, id);
        }
        id
    }

    pub fn group(&self, id: GroupId) -> &Group {
        self.groups[id.0].as_ref().expect("group must exist")
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        self.groups[id.0].as_mut().expect("group must exist")
    }

    pub fn all_group_ids(&self) -> Vec<GroupId> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|_| GroupId(i)))
            .collect()
    }

    fn new_group_id(&mut self) -> GroupId {
        let id = GroupId(self.groups.len());
        self.groups.push(None);
        id
    }

    fn fingerprint(&self, mexpr: &MultiExpression) -> u64 {
        let mut hasher = DefaultHasher::new();
        mexpr.hash_with(mexpr.operator.is_commuting(), &mut hasher);
        hasher.finish()
    }

    fn lookup_duplicate(&self, mexpr: &MultiExpression) -> Option<(GroupId, usize)> {
        let fp = self.fingerprint(mexpr);
        self.index.get(&fp)?.iter().find_map(|&(gid, idx)| {
            let group = self.groups[gid.0].as_ref()?;
            let candidate = group.logical.get(idx)?;
            candidate.equals(mexpr).then_some((gid, idx))
        })
    }

    fn lookup_equivalent(&self, mexpr: &MultiExpression) -> Option<GroupId> {
        let fp = self.fingerprint(mexpr);
        self.index.get(&fp)?.iter().find_map(|&(gid, idx)| {
            let group = self.groups[gid.0].as_ref()?;
            let candidate = group.logical.get(idx)?;
            candidate
                .equals_ignore_input_order(mexpr)
                .then_some(gid)
        })
    }

    /// Insert `expression` into the search space, returning the group it
    /// now lives in — whether that meant creating a new group, joining an
    /// existing equivalent group, or discovering it was an exact
    /// duplicate of an already-memoized multi-expression (§4.3 `Insert`).
    pub fn insert(
        &mut self,
        expression: &Expression,
        target_group: Option<GroupId>,
    ) -> Result<GroupId> {
        let (operator, children) = match expression {
            Expression::Ref(gid) => {
                let resolved = self.resolve(*gid);
                if let Some(target) = target_group {
                    let target = self.resolve(target);
                    if target != resolved {
                        self.merge_groups(target, resolved);
                        return Ok(self.resolve(resolved));
                    }
                }
                return Ok(resolved);
            }
            Expression::New { operator, children } => (operator, children),
        };

        if matches!(operator, Operator::Physical(PhysicalOp::BitmapIdxJoin)) && target_group.is_none()
        {
            bail!("unsupported operator: BitmapIdxJoin cannot be constructed directly (DDL path rejected)");
        }

        let mut child_groups = Vec::with_capacity(children.len());
        for child in children {
            let child_group = self.insert(child, None)?;
            child_groups.push(self.resolve(child_group));
        }

        let mexpr = MultiExpression::new(operator.clone(), child_groups, GroupId(0));

        // `Element` operators (predicates, projection lists, leaf column
        // references) are not `is_logical()`, but they still seed and
        // populate a group's `logical` list exactly as true logical
        // operators do (see `Group::logical`'s doc comment) -- only a
        // genuinely physical operator is barred from seeding a new group.
        let seeds_logical_list = !operator.is_physical();

        if seeds_logical_list {
            if let Some((dup_group, dup_idx)) = self.lookup_duplicate(&mexpr) {
                let dup_group = self.resolve(dup_group);
                if let Some(target) = target_group {
                    let target = self.resolve(target);
                    if target != dup_group {
                        self.merge_groups(target, dup_group);
                        trace!(event = "insert_duplicate_merged", group = %self.resolve(dup_group), idx = dup_idx);
                        return Ok(self.resolve(dup_group));
                    }
                }
                trace!(event = "insert_duplicate", group = %dup_group, idx = dup_idx);
                return Ok(dup_group);
            }
        }

        let resolved_target = match target_group {
            Some(t) => Some(self.resolve(t)),
            None => {
                if seeds_logical_list {
                    self.lookup_equivalent(&mexpr)
                } else {
                    None
                }
            }
        };

        let group_id = match resolved_target {
            Some(g) => g,
            None => self.new_group_id(),
        };

        let mut mexpr = mexpr;
        mexpr.group = group_id;

        let is_new_group = self.groups[group_id.0].is_none();
        if seeds_logical_list {
            if is_new_group {
                let properties = self.infer_properties(operator, &mexpr)?;
                let group = Group::new(group_id, mexpr.clone(), properties);
                self.groups[group_id.0] = Some(group);
                self.initialize_bounds(group_id);
            } else {
                self.group_mut(group_id).logical.push(mexpr.clone());
            }
            let real_idx = self.group(group_id).logical.len() - 1;
            let fp = self.fingerprint(&mexpr);
            self.index.entry(fp).or_default().push((group_id, real_idx));
        } else {
            if is_new_group {
                bail!("cannot insert a physical multi-expression as the seed of a new group");
            }
            self.group_mut(group_id).physical.push(mexpr.clone());
        }

        trace!(event = "insert_new", group = %group_id, op = mexpr.operator.name(), logical = seeds_logical_list);
        Ok(group_id)
    }

    fn merge_groups(&mut self, a: GroupId, b: GroupId) {
        let (survivor, absorbed) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        if survivor == absorbed {
            return;
        }
        trace!(event = "merge_group", survivor = %survivor, absorbed = %absorbed);
        let absorbed_group = self.groups[absorbed.0].take().expect("group must exist");
        self.merged_into.insert(absorbed, survivor);

        let survivor_group = self.groups[survivor.0].as_mut().expect("group must exist");
        for mexpr in absorbed_group.logical {
            survivor_group.logical.push(mexpr);
        }
        for mexpr in absorbed_group.physical {
            survivor_group.physical.push(mexpr);
        }
        // The absorbed group may have brought in cheaper members than any
        // winner already published for the survivor; re-open it so
        // `OptimizeGroup` re-derives instead of trusting a stale winner.
        survivor_group.changed = true;

        // Re-point every multi-expression's children that referenced the
        // absorbed group, and rebuild the hash index fingerprints for any
        // multi-expression whose fingerprint depends on child group ids.
        self.rewrite_children_after_merge(absorbed, survivor);
        self.rebuild_index();
    }

    fn rewrite_children_after_merge(&mut self, absorbed: GroupId, survivor: GroupId) {
        for slot in self.groups.iter_mut().flatten() {
            for mexpr in slot.logical.iter_mut().chain(slot.physical.iter_mut()) {
                for child in mexpr.children.iter_mut() {
                    if *child == absorbed {
                        *child = survivor;
                    }
                }
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        let ids: Vec<GroupId> = self.all_group_ids();
        for gid in ids {
            let len = self.group(gid).logical.len();
            for idx in 0..len {
                let mexpr = self.group(gid).logical[idx].clone();
                let fp = self.fingerprint(&mexpr);
                self.index.entry(fp).or_default().push((gid, idx));
            }
        }
    }

    fn initialize_bounds(&mut self, group_id: GroupId) {
        let group = self.group(group_id);
        let is_join = matches!(
            group.seed().operator,
            Operator::Logical(LogicalOp::EqJoin(_))
        );
        let estimated_size = if is_join {
            let tables = count_base_tables(self, group_id);
            2f64.powi(tables as i32) * 2.5
        } else {
            0.0
        };
        let lower_bound = crate::cost::touch_copy_cost(
            &self.group(group_id).properties,
            &self.max_column_unique_cardinality.iter().map(|&(uc, _)| uc).collect::<Vec<_>>(),
        );
        let lower_bound = if self.column_uc_pruning {
            lower_bound + crate::cost::fetching_cost(&self.max_column_unique_cardinality)
        } else {
            lower_bound
        };
        let group = self.group_mut(group_id);
        group.estimated_size = estimated_size;
        group.lower_bound = lower_bound;
    }

    fn infer_properties(
        &mut self,
        operator: &Operator,
        mexpr: &MultiExpression,
    ) -> Result<LogicalProperties> {
        let props = if let Operator::Logical(LogicalOp::GetTable(table_id)) = operator {
            self.base_table_properties(*table_id)?
        } else {
            let child_props: Vec<LogicalProperties> = mexpr
                .children
                .iter()
                .map(|&gid| self.group(gid).properties.clone())
                .collect();
            derive_logical_properties(operator, &child_props)?
        };
        props.check_invariants()?;
        if let LogicalProperties::Collection {
            is_base_table: true,
            per_column_statistics,
            ..
        } = &props
        {
            for stat in per_column_statistics {
                self.max_column_unique_cardinality
                    .push((stat.unique_cardinality, 8));
            }
        }
        Ok(props)
    }

    /// `GetTable` is the one logical operator whose properties can't be
    /// derived from its (nonexistent) children; it's read straight from
    /// the catalog instead (§6 external interfaces).
    fn base_table_properties(&self, table_id: crate::schema::TableId) -> Result<LogicalProperties> {
        let table = self.catalog.lookup_table_by_id(table_id)?;
        let columns = table.columns.iter().map(|c| c.column.clone()).collect();
        let per_column_statistics = table
            .columns
            .iter()
            .map(|c| ColumnStatistics {
                column: c.id,
                unique_cardinality: c.unique_cardinality,
            })
            .collect();
        Ok(LogicalProperties::Collection {
            schema: Schema::new(columns),
            cardinality: table.cardinality,
            unique_cardinality: table.cardinality,
            per_column_statistics,
            is_base_table: true,
        })
    }

    /// Invalidate every winner recorded for `group`, and reset its
    /// `optimized`/`explored`/`exploring` flags so a subsequent
    /// `OptimizeGroup` task re-derives them from scratch. Lets a driver
    /// re-run the search after, say, widening the cost limit or
    /// re-enabling a previously disabled rule, without throwing away the
    /// memoized multi-expressions themselves.
    pub fn clear_winners(&mut self, group: GroupId) {
        let group_id = self.resolve(group);
        let group = self.group_mut(group_id);
        group.clear_winners();
        group.optimized = false;
        group.explored = false;
        group.exploring = false;
    }

    /// A human-readable dump of every live group: id, seed operator,
    /// cardinality, and recorded winners. For interactive debugging and
    /// test assertions, not a wire format.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for gid in self.all_group_ids() {
            let group = self.group(gid);
            out.push_str(&format!(
                "{} [{}] card={:.1}\n",
                gid,
                group.seed().operator.name(),
                group.properties.cardinality()
            ));
            for winner in group.winners() {
                out.push_str(&format!(
                    "    winner required={:?} plan={:?} cost={:?} ready={}\n",
                    winner.required_properties, winner.plan, winner.cost, winner.ready
                ));
            }
        }
        out
    }
}

fn count_base_tables(space: &SearchSpace, group_id: GroupId) -> usize {
    fn visit(space: &SearchSpace, group_id: GroupId, seen: &mut std::collections::HashSet<GroupId>) -> usize {
        if !seen.insert(group_id) {
            return 0;
        }
        let group = space.group(group_id);
        match group.seed().operator {
            Operator::Logical(LogicalOp::GetTable(_)) => 1,
            _ => group
                .seed()
                .children
                .iter()
                .map(|&c| visit(space, c, seen))
                .sum(),
        }
    }
    let mut seen = std::collections::HashSet::new();
    visit(space, group_id, &mut seen)
}

fn derive_logical_properties(
    operator: &Operator,
    children: &[LogicalProperties],
) -> Result<LogicalProperties> {
    match operator {
        Operator::Element(op) => derive_element_properties(op, children),
        Operator::Logical(op) => derive_collection_properties(op, children),
        _ => bail!("derive_logical_properties called on non-logical, non-element operator"),
    }
}

fn derive_element_properties(
    op: &ElementOp,
    _children: &[LogicalProperties],
) -> Result<LogicalProperties> {
    Ok(match op {
        ElementOp::Compare(_) => LogicalProperties::Element {
            column_statistics: None,
            ty: crate::schema::DataType::Bool,
            size_bytes: 1,
            selectivity: 0.1,
            is_constant: false,
            input_columns: vec![],
        },
        ElementOp::AggregationFunction(_) => LogicalProperties::Element {
            column_statistics: None,
            ty: crate::schema::DataType::Int,
            size_bytes: 8,
            selectivity: 1.0,
            is_constant: false,
            input_columns: vec![],
        },
        ElementOp::GetColumn(col) => LogicalProperties::Element {
            column_statistics: Some(ColumnStatistics {
                column: *col,
                unique_cardinality: 0.0,
            }),
            ty: crate::schema::DataType::Int,
            size_bytes: 8,
            selectivity: 1.0,
            is_constant: false,
            input_columns: vec![*col],
        },
        ElementOp::Constant(v) => LogicalProperties::Element {
            column_statistics: None,
            ty: match v {
                crate::operator::ConstantValue::Int(_) => crate::schema::DataType::Int,
                crate::operator::ConstantValue::Float(_) => crate::schema::DataType::Float,
                crate::operator::ConstantValue::Bool(_) => crate::schema::DataType::Bool,
                crate::operator::ConstantValue::Str(_) => crate::schema::DataType::Varchar,
            },
            size_bytes: 8,
            selectivity: 1.0,
            is_constant: true,
            input_columns: vec![],
        },
    })
}

fn derive_collection_properties(
    op: &LogicalOp,
    children: &[LogicalProperties],
) -> Result<LogicalProperties> {
    match op {
        LogicalOp::GetTable(_) => {
            bail!("GetTable properties must be supplied directly from the catalog by the caller")
        }
        LogicalOp::Select => {
            let (schema, cardinality, unique_cardinality, stats, _) = children[0]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("Select input must be a collection"))?;
            let selectivity = match &children[1] {
                LogicalProperties::Element { selectivity, .. } => *selectivity,
                _ => 0.1,
            };
            Ok(LogicalProperties::Collection {
                schema: schema.clone(),
                cardinality: cardinality * selectivity,
                unique_cardinality: (unique_cardinality * selectivity).max(1.0),
                per_column_statistics: stats.to_vec(),
                is_base_table: false,
            })
        }
        LogicalOp::Project(cols) => {
            let (schema, cardinality, unique_cardinality, stats, _) = children[0]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("Project input must be a collection"))?;
            let projected_schema = schema.project(&cols.iter().map(|&c| c as usize).collect::<Vec<_>>());
            let projected_stats: Vec<ColumnStatistics> = cols
                .iter()
                .filter_map(|&c| stats.iter().find(|s| s.column == c).cloned())
                .collect();
            Ok(LogicalProperties::Collection {
                schema: projected_schema,
                cardinality,
                unique_cardinality,
                per_column_statistics: projected_stats,
                is_base_table: false,
            })
        }
        LogicalOp::EqJoin(_) => {
            let (lschema, lcard, luc, lstats, _) = children[0]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("EqJoin left input must be a collection"))?;
            let (rschema, rcard, ruc, rstats, _) = children[1]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("EqJoin right input must be a collection"))?;
            let schema = Schema::concat(&[lschema, rschema]);
            let cardinality = (lcard * rcard) / luc.max(ruc).max(1.0);
            let unique_cardinality = luc.min(ruc);
            let mut stats = lstats.to_vec();
            stats.extend(rstats.iter().cloned());
            Ok(LogicalProperties::Collection {
                schema,
                cardinality,
                unique_cardinality,
                per_column_statistics: stats,
                is_base_table: false,
            })
        }
        LogicalOp::Distinct => {
            let (schema, _cardinality, unique_cardinality, stats, _) = children[0]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("Distinct input must be a collection"))?;
            Ok(LogicalProperties::Collection {
                schema: schema.clone(),
                cardinality: unique_cardinality,
                unique_cardinality,
                per_column_statistics: stats.to_vec(),
                is_base_table: false,
            })
        }
        LogicalOp::Aggregate { group_by, .. } => {
            let (schema, cardinality, _unique_cardinality, stats, _) = children[0]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("Aggregate input must be a collection"))?;
            let projected_schema = schema.project(&group_by.iter().map(|&c| c as usize).collect::<Vec<_>>());
            let group_card = cardinality.sqrt().max(1.0);
            Ok(LogicalProperties::Collection {
                schema: projected_schema,
                cardinality: group_card,
                unique_cardinality: group_card,
                per_column_statistics: stats
                    .iter()
                    .filter(|s| group_by.contains(&s.column))
                    .cloned()
                    .collect(),
                is_base_table: false,
            })
        }
        LogicalOp::OrderBy(_) => {
            let (schema, cardinality, unique_cardinality, stats, _) = children[0]
                .as_collection()
                .ok_or_else(|| anyhow::anyhow!("OrderBy input must be a collection"))?;
            Ok(LogicalProperties::Collection {
                schema: schema.clone(),
                cardinality,
                unique_cardinality,
                per_column_statistics: stats.to_vec(),
                is_base_table: false,
            })
        }
    }
}
