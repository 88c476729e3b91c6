//! Shared schema definition types for neuronek-db
//!
//! This crate provides the const-friendly building blocks a schema is
//! declared with:
//!
//! - [`ModelDef`] - a model with its fields, relations and compound uniques
//! - [`FieldDef`] / [`ScalarType`] / [`DefaultValue`] - scalar fields
//! - [`RelationDef`] / [`Cardinality`] / [`JoinTableDef`] / [`ReferentialAction`] - relations
//! - [`UniqueDef`] - compound unique constraints
//!
//! Definitions are plain `Copy` data and can live in `const` items. The
//! runtime registry in `neuronek-db-core` validates and indexes them.

mod field;
mod model;
mod relation;
mod scalar;
mod unique;

pub use field::FieldDef;
pub use model::ModelDef;
pub use relation::{Cardinality, JoinTableDef, ReferentialAction, RelationDef};
pub use scalar::{DefaultValue, ScalarType};
pub use unique::UniqueDef;

/// Prelude module for commonly used types
pub mod prelude {
    pub use crate::{
        Cardinality, DefaultValue, FieldDef, JoinTableDef, ModelDef, ReferentialAction,
        RelationDef, ScalarType, UniqueDef,
    };
}
