//! The external catalog interface the optimizer consumes.
//!
//! The optimizer never owns schema or statistics persistence; it only ever
//! sees a read-only view through this trait. Production code plugs in a
//! real catalog; tests and this crate's own doctests use
//! [`InMemoryCatalog`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::schema::{Column, ColumnId, TableId};

#[derive(Clone, Debug)]
pub struct ColumnDescriptor {
    pub id: ColumnId,
    pub column: Column,
    /// Number of distinct values, used for unique-cardinality bookkeeping.
    pub unique_cardinality: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Bitmap,
}

#[derive(Clone, Debug)]
pub struct IndexDescriptor {
    pub kind: IndexKind,
    pub clustered: bool,
    pub sort_key: Vec<ColumnId>,
}

#[derive(Clone, Debug)]
pub struct TableDescriptor {
    pub id: TableId,
    pub name: Arc<str>,
    pub columns: Vec<ColumnDescriptor>,
    pub cardinality: f64,
    pub pages: u64,
    pub indexes: Vec<IndexDescriptor>,
}

/// Read-only catalog view consumed by the optimizer.
pub trait Catalog: Send + Sync {
    fn page_size(&self) -> u64;
    fn has_table(&self, name: &str) -> bool;
    fn lookup_table(&self, name: &str) -> Result<TableDescriptor>;
    fn lookup_table_by_id(&self, id: TableId) -> Result<TableDescriptor>;
    fn lookup_column(&self, table_id: TableId, name: &str) -> Result<ColumnDescriptor>;
    fn indexes_of(&self, table_id: TableId) -> Vec<IndexDescriptor>;
}

/// A simple in-memory catalog, used by tests and as a reference
/// implementation for embedders that don't yet have a real one.
#[derive(Default)]
pub struct InMemoryCatalog {
    page_size: u64,
    tables_by_name: HashMap<String, TableDescriptor>,
    tables_by_id: HashMap<TableId, TableDescriptor>,
}

impl InMemoryCatalog {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn add_table(&mut self, table: TableDescriptor) {
        self.tables_by_id.insert(table.id, table.clone());
        self.tables_by_name.insert(table.name.to_string(), table);
    }
}

impl Catalog for InMemoryCatalog {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables_by_name.contains_key(name)
    }

    fn lookup_table(&self, name: &str) -> Result<TableDescriptor> {
        self.tables_by_name
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown table: {name}"))
    }

    fn lookup_table_by_id(&self, id: TableId) -> Result<TableDescriptor> {
        self.tables_by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown table id: {id}"))
    }

    fn lookup_column(&self, table_id: TableId, name: &str) -> Result<ColumnDescriptor> {
        let table = self.lookup_table_by_id(table_id)?;
        table
            .columns
            .iter()
            .find(|c| &*c.column.name == name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown column {name} on table {table_id}"))
    }

    fn indexes_of(&self, table_id: TableId) -> Vec<IndexDescriptor> {
        self.tables_by_id
            .get(&table_id)
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }
}
