//! Logical properties: shared statistics every member of a group agrees
//! on, derived once from the group's seed multi-expression.
//!
//! Modeled as a tagged enum rather than the teacher's base-class-plus-
//! downcast (`PropertyBuilderAny` / `Box<dyn Any>`) because the property
//! shapes here are fixed and small (DESIGN NOTES: "no shared base type is
//! required — variants carry only the fields that apply").

use crate::schema::{ColumnId, Schema};

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnStatistics {
    pub column: ColumnId,
    pub unique_cardinality: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogicalProperties {
    /// Properties of a row-producing (collection-shaped) operator: table
    /// scans, joins, projections, aggregates, sorts.
    Collection {
        schema: Schema,
        cardinality: f64,
        unique_cardinality: f64,
        per_column_statistics: Vec<ColumnStatistics>,
        is_base_table: bool,
    },
    /// Properties of a scalar/element-shaped sub-expression (predicates,
    /// projection lists, aggregation function applications).
    Element {
        column_statistics: Option<ColumnStatistics>,
        ty: crate::schema::DataType,
        size_bytes: u64,
        selectivity: f64,
        is_constant: bool,
        input_columns: Vec<ColumnId>,
    },
}

impl LogicalProperties {
    pub fn cardinality(&self) -> f64 {
        match self {
            LogicalProperties::Collection { cardinality, .. } => *cardinality,
            LogicalProperties::Element { .. } => 1.0,
        }
    }

    pub fn unique_cardinality(&self) -> f64 {
        match self {
            LogicalProperties::Collection {
                unique_cardinality, ..
            } => *unique_cardinality,
            LogicalProperties::Element { .. } => 1.0,
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        match self {
            LogicalProperties::Collection { schema, .. } => Some(schema),
            LogicalProperties::Element { .. } => None,
        }
    }

    pub fn as_collection(&self) -> Option<(&Schema, f64, f64, &[ColumnStatistics], bool)> {
        match self {
            LogicalProperties::Collection {
                schema,
                cardinality,
                unique_cardinality,
                per_column_statistics,
                is_base_table,
            } => Some((
                schema,
                *cardinality,
                *unique_cardinality,
                per_column_statistics,
                *is_base_table,
            )),
            LogicalProperties::Element { .. } => None,
        }
    }

    /// Invariant check: `|schema.columns| == |per_column_statistics|` for
    /// collection properties (§3 invariants, `LogicalCollectionProperties`).
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        if let LogicalProperties::Collection {
            schema,
            per_column_statistics,
            ..
        } = self
        {
            anyhow::ensure!(
                schema.columns.len() == per_column_statistics.len(),
                "logical collection properties invariant violated: {} columns vs {} stats",
                schema.columns.len(),
                per_column_statistics.len()
            );
        }
        Ok(())
    }
}
