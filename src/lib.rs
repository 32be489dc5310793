#![allow(clippy::new_without_default)]

//! Cost-based query optimizer core: a Cascades/Columbia-style top-down
//! search over a memoized forest of equivalent expressions.

pub mod catalog;
pub mod cost;
pub mod error;
pub mod expression;
pub mod extractor;
pub mod group;
pub mod operator;
pub mod optimizer;
pub mod properties;
pub mod rules;
pub mod schema;
pub mod search_space;
pub mod tasks;

pub use catalog::{Catalog, ColumnDescriptor, IndexDescriptor, TableDescriptor};
pub use cost::Cost;
pub use expression::{Expression, MultiExpression};
pub use extractor::ExplainedExpression;
pub use operator::Operator;
pub use optimizer::{Optimizer, OptimizerDiagnostics, OptimizerSettings};
pub use properties::{LogicalProperties, Order, PhysicalProperties};
pub use search_space::{GroupId, SearchSpace};
