//! Model definitions

use crate::field::FieldDef;
use crate::relation::RelationDef;
use crate::unique::UniqueDef;

/// Const-friendly model definition.
///
/// # Examples
///
/// ```
/// use neuronek_db_types::{FieldDef, ModelDef, RelationDef};
///
/// const ACCOUNT_FIELDS: &[FieldDef] = &[
///     FieldDef::string("id").id().default_uuid(),
///     FieldDef::string("username").unique(),
///     FieldDef::string("password"),
/// ];
/// const ACCOUNT_RELATIONS: &[RelationDef] = &[RelationDef::to_many("subjects", "Subject")
///     .fields(&["id"])
///     .references(&["account_id"])];
///
/// const ACCOUNT: ModelDef = ModelDef::new("Account")
///     .fields(ACCOUNT_FIELDS)
///     .relations(ACCOUNT_RELATIONS);
///
/// assert_eq!(ACCOUNT.id_field().map(|f| f.name), Some("id"));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelDef {
    /// Model name
    pub name: &'static str,
    /// Scalar fields in declaration order
    pub fields: &'static [FieldDef],
    /// Relation fields
    pub relations: &'static [RelationDef],
    /// Compound unique constraints
    pub uniques: &'static [UniqueDef],
}

impl ModelDef {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: &[],
            relations: &[],
            uniques: &[],
        }
    }

    #[must_use]
    pub const fn fields(self, fields: &'static [FieldDef]) -> Self {
        Self { fields, ..self }
    }

    #[must_use]
    pub const fn relations(self, relations: &'static [RelationDef]) -> Self {
        Self { relations, ..self }
    }

    #[must_use]
    pub const fn uniques(self, uniques: &'static [UniqueDef]) -> Self {
        Self { uniques, ..self }
    }

    /// The identifier field, if one is declared
    #[must_use]
    pub fn id_field(&self) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.is_id)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}
