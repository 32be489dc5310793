//! The closed operator algebra (C1).
//!
//! Rather than the teacher's generic `RelNodeTyp` trait dispatched through
//! dynamic `Rule<T, O>` objects, this optimizer's operator set is closed
//! and small enough to model directly as an enum. Pattern matching on
//! `Operator` replaces the trait-object dispatch the teacher uses for a
//! user-extensible node type, per DESIGN NOTES in the distilled spec: the
//! reimplementation target is a tagged variant, not nominal inheritance.

use std::hash::{Hash, Hasher};

use crate::properties::PhysicalProperties;
use crate::schema::ColumnId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// A predicate/projection/aggregation payload. These are always leaves of
/// the expression tree (arity 0) and never own group references.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementOp {
    /// `lhs OP rhs`, variadic only in the sense that a `Compare` node's
    /// children are themselves `Element` expressions; the comparison
    /// operator itself is fixed arity 2.
    Compare(CompareOp),
    AggregationFunction(AggregateFunction),
    GetColumn(ColumnId),
    Constant(ConstantValue),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Eq for ConstantValue {}

impl Hash for ConstantValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ConstantValue::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            ConstantValue::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            ConstantValue::Bool(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            ConstantValue::Str(v) => {
                3u8.hash(state);
                v.hash(state);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    GetTable(crate::schema::TableId),
    Select,
    Project(Vec<ColumnId>),
    /// Equijoin on `(left_key, right_key)` column pairs.
    EqJoin(Vec<(ColumnId, ColumnId)>),
    Distinct,
    Aggregate {
        group_by: Vec<ColumnId>,
        functions: Vec<AggregateFunction>,
    },
    OrderBy(Vec<ColumnId>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalOp {
    FileScan(crate::schema::TableId),
    Filter,
    /// Scans `TableId` through a BTree index; `Some(key)` when that index
    /// also happens to deliver its rows in `key` order, `None` when only
    /// an unordered (Bitmap) index backs it.
    IdxFilter(crate::schema::TableId, Option<Vec<ColumnId>>),
    /// Drops the columns outside its `Project` list; doesn't touch order.
    Truncate(Vec<ColumnId>),
    NLJoin,
    BlockNLJoin,
    IdxNLJoin,
    /// Equijoin on `(left_key, right_key)` pairs, consuming both inputs in
    /// `left_key`/`right_key` sorted order.
    MergeJoin(Vec<(ColumnId, ColumnId)>),
    HashJoin,
    HybridHashJoin,
    BitmapIdxJoin,
    GJoin,
    HashDuplicates,
    HashAggregate,
    /// Aggregation over an input already sorted on `group_by`.
    SortAggregate(Vec<ColumnId>),
    /// The `Sort` enforcer: changes physical properties, not logical
    /// content.
    Sort(Vec<ColumnId>),
}

/// A pattern wildcard: "any group is acceptable here". Only ever appears
/// inside a [`crate::rules::Pattern`], never inside a real `Operator`
/// value that has been inserted into the search space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeafOp;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Logical(LogicalOp),
    Physical(PhysicalOp),
    Element(ElementOp),
}

impl Operator {
    pub fn arity(&self) -> usize {
        match self {
            Operator::Logical(op) => match op {
                LogicalOp::GetTable(_) => 0,
                LogicalOp::Select => 2,  // input, predicate
                LogicalOp::Project(_) => 1,
                LogicalOp::EqJoin(_) => 2,
                LogicalOp::Distinct => 1,
                LogicalOp::Aggregate { .. } => 1,
                LogicalOp::OrderBy(_) => 1,
            },
            Operator::Physical(op) => match op {
                PhysicalOp::FileScan(_) => 0,
                PhysicalOp::Filter => 2,
                PhysicalOp::IdxFilter(..) => 1,
                PhysicalOp::Truncate(_) => 1,
                PhysicalOp::MergeJoin(_) => 2,
                PhysicalOp::NLJoin
                | PhysicalOp::BlockNLJoin
                | PhysicalOp::IdxNLJoin
                | PhysicalOp::HashJoin
                | PhysicalOp::HybridHashJoin
                | PhysicalOp::BitmapIdxJoin
                | PhysicalOp::GJoin => 2,
                PhysicalOp::HashDuplicates => 1,
                PhysicalOp::HashAggregate => 1,
                PhysicalOp::SortAggregate(_) => 1,
                PhysicalOp::Sort(_) => 1,
            },
            Operator::Element(op) => match op {
                ElementOp::Compare(_) => 2,
                ElementOp::AggregationFunction(_) => 1,
                ElementOp::GetColumn(_) => 0,
                ElementOp::Constant(_) => 0,
            },
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Operator::Element(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Operator::Element(ElementOp::GetColumn(_) | ElementOp::Constant(_))
        )
    }

    /// Whether this operator's children may be freely reordered without
    /// changing logical meaning. Only `EqJoin` is commutative in this
    /// algebra (no `UnionAll`/set-ops in scope).
    pub fn is_commuting(&self) -> bool {
        matches!(self, Operator::Logical(LogicalOp::EqJoin(_)))
    }

    /// Exact structural equality, input order significant.
    pub fn equals(&self, other: &Operator) -> bool {
        self == other
    }

    /// Structural equality that ignores the order of commuting operators'
    /// direct semantic payload ordering (the key-pair list is treated as
    /// a set). Children ordering is handled by the caller
    /// ([`crate::expression::MultiExpression`]), since `Operator` itself
    /// does not carry children.
    pub fn equals_ignore_input_order(&self, other: &Operator) -> bool {
        match (self, other) {
            (Operator::Logical(LogicalOp::EqJoin(a)), Operator::Logical(LogicalOp::EqJoin(b))) => {
                use itertools::Itertools;
                a.iter().sorted().eq(b.iter().sorted())
            }
            _ => self.equals(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Logical(op) => match op {
                LogicalOp::GetTable(_) => "GetTable",
                LogicalOp::Select => "Select",
                LogicalOp::Project(_) => "Project",
                LogicalOp::EqJoin(_) => "EqJoin",
                LogicalOp::Distinct => "Distinct",
                LogicalOp::Aggregate { .. } => "Aggregate",
                LogicalOp::OrderBy(_) => "OrderBy",
            },
            Operator::Physical(op) => match op {
                PhysicalOp::FileScan(_) => "FileScan",
                PhysicalOp::Filter => "Filter",
                PhysicalOp::IdxFilter(..) => "IdxFilter",
                PhysicalOp::Truncate(_) => "Truncate",
                PhysicalOp::NLJoin => "NLJoin",
                PhysicalOp::BlockNLJoin => "BlockNLJoin",
                PhysicalOp::IdxNLJoin => "IdxNLJoin",
                PhysicalOp::MergeJoin(_) => "MergeJoin",
                PhysicalOp::HashJoin => "HashJoin",
                PhysicalOp::HybridHashJoin => "HybridHashJoin",
                PhysicalOp::BitmapIdxJoin => "BitmapIdxJoin",
                PhysicalOp::GJoin => "GJoin",
                PhysicalOp::HashDuplicates => "HashDuplicates",
                PhysicalOp::HashAggregate => "HashAggregate",
                PhysicalOp::SortAggregate(_) => "SortAggregate",
                PhysicalOp::Sort(_) => "Sort",
            },
            Operator::Element(op) => match op {
                ElementOp::Compare(_) => "Compare",
                ElementOp::AggregationFunction(_) => "AggregationFunction",
                ElementOp::GetColumn(_) => "GetColumn",
                ElementOp::Constant(_) => "Constant",
            },
        }
    }

    /// The physical properties this operator's own output carries, given
    /// the properties its children were optimized under. Only physical
    /// operators have an opinion here; everything else is `Any`.
    pub fn derive_physical_properties(&self, children: &[PhysicalProperties]) -> PhysicalProperties {
        match self {
            Operator::Physical(PhysicalOp::Filter) | Operator::Physical(PhysicalOp::Truncate(_)) => {
                children[0].clone()
            }
            Operator::Physical(PhysicalOp::IdxFilter(_, Some(key))) => PhysicalProperties::sorted(key.clone()),
            Operator::Physical(PhysicalOp::MergeJoin(pairs)) => {
                PhysicalProperties::sorted(pairs.iter().map(|&(l, _)| l).collect())
            }
            Operator::Physical(PhysicalOp::SortAggregate(group_by)) => {
                PhysicalProperties::sorted(group_by.clone())
            }
            Operator::Physical(PhysicalOp::Sort(cols)) => PhysicalProperties::sorted(cols.clone()),
            _ => PhysicalProperties::any(),
        }
    }

    /// Given the properties required of this operator's own output,
    /// either `None` (this operator can never produce them) or the
    /// properties each of its children must in turn be optimized under
    /// (§4.1/§4.6). Every physical operator that isn't an order-sensitive
    /// access method or enforcer is feasible only when `required` is
    /// `Any`, since nothing else in this catalog preserves or imposes
    /// order on its output.
    pub fn satisfy_required_properties(&self, required: &PhysicalProperties) -> Option<Vec<PhysicalProperties>> {
        // `own` is never a wildcard here, so this only trusts the `Any`
        // side of `PhysicalProperties`'s wildcard `Eq` when `required`
        // itself is `Any` -- an unordered `own` must never pass a concrete
        // `required`.
        fn satisfies(own: &PhysicalProperties, required: &PhysicalProperties) -> bool {
            required.is_any() || (!own.is_any() && own == required)
        }

        match self {
            Operator::Physical(PhysicalOp::FileScan(_)) => required.is_any().then(Vec::new),
            Operator::Physical(PhysicalOp::Filter) => {
                Some(vec![required.clone(), PhysicalProperties::any()])
            }
            Operator::Physical(PhysicalOp::Truncate(_)) => Some(vec![required.clone()]),
            Operator::Physical(PhysicalOp::IdxFilter(_, sort_key)) => {
                let own = sort_key
                    .as_ref()
                    .map(|k| PhysicalProperties::sorted(k.clone()))
                    .unwrap_or_else(PhysicalProperties::any);
                // One child: the predicate it probes the index with.
                satisfies(&own, required).then(|| vec![PhysicalProperties::any()])
            }
            Operator::Physical(PhysicalOp::MergeJoin(pairs)) => {
                let own = PhysicalProperties::sorted(pairs.iter().map(|&(l, _)| l).collect());
                satisfies(&own, required).then(|| {
                    vec![
                        PhysicalProperties::sorted(pairs.iter().map(|&(l, _)| l).collect()),
                        PhysicalProperties::sorted(pairs.iter().map(|&(_, r)| r).collect()),
                    ]
                })
            }
            Operator::Physical(PhysicalOp::SortAggregate(group_by)) => {
                let own = PhysicalProperties::sorted(group_by.clone());
                satisfies(&own, required).then(|| vec![own])
            }
            Operator::Physical(PhysicalOp::Sort(cols)) => {
                let own = PhysicalProperties::sorted(cols.clone());
                satisfies(&own, required).then(|| vec![PhysicalProperties::any()])
            }
            Operator::Physical(
                PhysicalOp::NLJoin
                | PhysicalOp::BlockNLJoin
                | PhysicalOp::IdxNLJoin
                | PhysicalOp::HashJoin
                | PhysicalOp::HybridHashJoin
                | PhysicalOp::BitmapIdxJoin
                | PhysicalOp::GJoin,
            ) => required.is_any().then(|| vec![PhysicalProperties::any(), PhysicalProperties::any()]),
            Operator::Physical(PhysicalOp::HashDuplicates | PhysicalOp::HashAggregate) => {
                required.is_any().then(|| vec![PhysicalProperties::any()])
            }
            _ => None,
        }
    }
}

/// Hash an operator the commuting-aware way: when `ignore_input_order` is
/// set and the operator commutes, canonicalize its payload before hashing
/// so that e.g. `EqJoin([(a,b)])` and the input-reordered equivalent land
/// in the same bucket. Children hashing (which dominates bucket
/// selection in practice) is done by the caller over the already-reduced
/// group id children.
pub fn hash_operator<H: Hasher>(op: &Operator, ignore_input_order: bool, state: &mut H) {
    if ignore_input_order {
        if let Operator::Logical(LogicalOp::EqJoin(pairs)) = op {
            use itertools::Itertools;
            let sorted: Vec<_> = pairs.iter().cloned().sorted().collect();
            std::mem::discriminant(op).hash(state);
            sorted.hash(state);
            return;
        }
    }
    op.hash(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eqjoin_commutes_under_ignore_order() {
        let a = Operator::Logical(LogicalOp::EqJoin(vec![(1, 2)]));
        let b = Operator::Logical(LogicalOp::EqJoin(vec![(2, 1)]));
        // Payload itself doesn't auto-swap; it's the *children* (group refs)
        // that get canonicalized by MultiExpression. Here we only check the
        // trivial case where payload already matches.
        assert!(a.equals_ignore_input_order(&a));
        assert!(!a.equals(&b));
    }

    #[test]
    fn arity_matches_spec() {
        assert_eq!(Operator::Logical(LogicalOp::GetTable(1)).arity(), 0);
        assert_eq!(Operator::Logical(LogicalOp::Select).arity(), 2);
        assert_eq!(Operator::Logical(LogicalOp::EqJoin(vec![])).arity(), 2);
        assert_eq!(Operator::Physical(PhysicalOp::FileScan(1)).arity(), 0);
        assert_eq!(Operator::Physical(PhysicalOp::HashJoin).arity(), 2);
        assert_eq!(Operator::Physical(PhysicalOp::Sort(vec![])).arity(), 1);
    }

    #[test]
    fn only_eqjoin_commutes() {
        assert!(Operator::Logical(LogicalOp::EqJoin(vec![])).is_commuting());
        assert!(!Operator::Logical(LogicalOp::Select).is_commuting());
        assert!(!Operator::Physical(PhysicalOp::HashJoin).is_commuting());
    }
}
