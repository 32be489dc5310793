//! Minimal tuple-schema types.
//!
//! The full tuple schema library (column/table reference resolution, size
//! and type arithmetic) is an external collaborator per the optimizer's
//! scope; this module carries only the sliver the optimizer itself needs
//! to derive logical properties and report widths.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stable identifier for a base table, assigned by the catalog.
pub type TableId = u32;

/// A stable identifier for a column within a table.
pub type ColumnId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Float,
    Bool,
    Varchar,
}

impl DataType {
    /// Width in bytes used by the cost model's fetching-cost estimate.
    pub fn width_bytes(&self) -> u64 {
        match self {
            DataType::Int => 8,
            DataType::Float => 8,
            DataType::Bool => 1,
            DataType::Varchar => 32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub table: Option<TableId>,
    pub name: Arc<str>,
    pub ty: DataType,
}

impl Column {
    pub fn new(name: impl Into<Arc<str>>, ty: DataType) -> Self {
        Self {
            table: None,
            name: name.into(),
            ty,
        }
    }

    pub fn from_table(table: TableId, name: impl Into<Arc<str>>, ty: DataType) -> Self {
        Self {
            table: Some(table),
            name: name.into(),
            ty,
        }
    }
}

/// An ordered list of columns produced by a logical operator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn width_bytes(&self) -> u64 {
        self.columns.iter().map(|c| c.ty.width_bytes()).sum()
    }

    pub fn concat(schemas: &[&Schema]) -> Schema {
        let mut columns = Vec::new();
        for schema in schemas {
            columns.extend(schema.columns.iter().cloned());
        }
        Schema { columns }
    }

    pub fn project(&self, indices: &[usize]) -> Schema {
        Schema {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }
}
