//! Relation definitions

/// How many rows a relation yields per parent row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Zero or one related row
    One,
    /// Zero or more related rows
    Many,
}

/// Referential action applied to the owning side when the referenced row is deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum ReferentialAction {
    /// Block the delete while references exist
    #[default]
    Restrict,
    /// Clear the foreign key
    SetNull,
    /// Delete the referencing rows
    Cascade,
}

impl ReferentialAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Restrict => "Restrict",
            Self::SetNull => "SetNull",
            Self::Cascade => "Cascade",
        }
    }
}

/// Join table backing an implicit many-to-many relation
///
/// Each join row holds one `source_column` value (the local key) and one
/// `target_column` value (the target key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JoinTableDef {
    /// Join table name
    pub name: &'static str,
    /// Column referencing this side's key
    pub source_column: &'static str,
    /// Column referencing the target's key
    pub target_column: &'static str,
}

impl JoinTableDef {
    #[must_use]
    pub const fn new(
        name: &'static str,
        source_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self {
            name,
            source_column,
            target_column,
        }
    }
}

/// Const-friendly relation definition.
///
/// `fields` are key fields on this model and `references` the matching key
/// fields on the target. The owning side is the one whose `fields` form a
/// foreign key.
///
/// # Examples
///
/// ```
/// use neuronek_db_types::{Cardinality, RelationDef, ReferentialAction};
///
/// // Subject.account_id -> Account.id
/// const ACCOUNT: RelationDef = RelationDef::to_one("account", "Account")
///     .fields(&["account_id"])
///     .references(&["id"])
///     .owning()
///     .on_delete(ReferentialAction::SetNull);
///
/// // Account.id <- Subject.account_id
/// const SUBJECTS: RelationDef = RelationDef::to_many("subjects", "Subject")
///     .fields(&["id"])
///     .references(&["account_id"]);
///
/// assert!(ACCOUNT.owning);
/// assert_eq!(SUBJECTS.cardinality, Cardinality::Many);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RelationDef {
    /// Relation field name
    pub name: &'static str,
    /// Target model name
    pub target: &'static str,
    /// To-one or to-many
    pub cardinality: Cardinality,
    /// Key fields on this model
    pub fields: &'static [&'static str],
    /// Key fields on the target model
    pub references: &'static [&'static str],
    /// This side holds the foreign key
    pub owning: bool,
    /// The foreign key may not be null (owning side only)
    pub required: bool,
    /// Action when the referenced row is deleted (owning side only)
    pub on_delete: ReferentialAction,
    /// Join table for many-to-many relations
    pub join: Option<JoinTableDef>,
}

impl RelationDef {
    #[must_use]
    pub const fn new(name: &'static str, target: &'static str, cardinality: Cardinality) -> Self {
        Self {
            name,
            target,
            cardinality,
            fields: &[],
            references: &[],
            owning: false,
            required: false,
            on_delete: ReferentialAction::SetNull,
            join: None,
        }
    }

    #[must_use]
    pub const fn to_one(name: &'static str, target: &'static str) -> Self {
        Self::new(name, target, Cardinality::One)
    }

    #[must_use]
    pub const fn to_many(name: &'static str, target: &'static str) -> Self {
        Self::new(name, target, Cardinality::Many)
    }

    /// A many-to-many relation keyed by both models' ids through `join`
    #[must_use]
    pub const fn many_to_many(name: &'static str, target: &'static str, join: JoinTableDef) -> Self {
        Self {
            join: Some(join),
            fields: &["id"],
            references: &["id"],
            ..Self::new(name, target, Cardinality::Many)
        }
    }

    /// Set local key fields
    #[must_use]
    pub const fn fields(self, fields: &'static [&'static str]) -> Self {
        Self { fields, ..self }
    }

    /// Set target key fields
    #[must_use]
    pub const fn references(self, references: &'static [&'static str]) -> Self {
        Self { references, ..self }
    }

    /// Mark this side as holding the foreign key
    #[must_use]
    pub const fn owning(self) -> Self {
        Self {
            owning: true,
            ..self
        }
    }

    /// Forbid a null foreign key; deletes of the target are restricted
    #[must_use]
    pub const fn required(self) -> Self {
        Self {
            required: true,
            on_delete: ReferentialAction::Restrict,
            ..self
        }
    }

    /// Set ON DELETE action
    #[must_use]
    pub const fn on_delete(self, action: ReferentialAction) -> Self {
        Self {
            on_delete: action,
            ..self
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_many_to_many(&self) -> bool {
        self.join.is_some()
    }

    #[inline]
    #[must_use]
    pub const fn is_to_many(&self) -> bool {
        matches!(self.cardinality, Cardinality::Many)
    }
}
