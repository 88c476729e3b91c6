//! Scalar field definitions

use crate::scalar::{DefaultValue, ScalarType};

/// Const-friendly scalar field definition.
///
/// # Examples
///
/// ```
/// use neuronek_db_types::{FieldDef, ScalarType};
///
/// const FIELDS: &[FieldDef] = &[
///     FieldDef::string("id").id().default_uuid(),
///     FieldDef::string("username").unique(),
///     FieldDef::float("weight").optional(),
/// ];
///
/// assert!(FIELDS[0].is_id);
/// assert_eq!(FIELDS[2].ty, ScalarType::Float);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: &'static str,
    /// Storage type
    pub ty: ScalarType,
    /// May hold `null`
    pub nullable: bool,
    /// Single-field UNIQUE constraint
    pub unique: bool,
    /// Identifier field of the model
    pub is_id: bool,
    /// Value applied on create when the field is unset
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    /// Create a required field of the given type
    #[must_use]
    pub const fn new(name: &'static str, ty: ScalarType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
            is_id: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, ScalarType::String)
    }

    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self::new(name, ScalarType::Int)
    }

    #[must_use]
    pub const fn float(name: &'static str) -> Self {
        Self::new(name, ScalarType::Float)
    }

    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ScalarType::Boolean)
    }

    #[must_use]
    pub const fn datetime(name: &'static str) -> Self {
        Self::new(name, ScalarType::DateTime)
    }

    /// Allow `null`
    #[must_use]
    pub const fn optional(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    /// Set UNIQUE constraint
    #[must_use]
    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    /// Mark as the model identifier (implies UNIQUE, NOT NULL)
    #[must_use]
    pub const fn id(self) -> Self {
        Self {
            is_id: true,
            unique: true,
            nullable: false,
            ..self
        }
    }

    /// Default to a generated UUID
    #[must_use]
    pub const fn default_uuid(self) -> Self {
        self.default_value(DefaultValue::Uuid)
    }

    /// Default to the creation time
    #[must_use]
    pub const fn default_now(self) -> Self {
        self.default_value(DefaultValue::Now)
    }

    /// Set default value
    #[must_use]
    pub const fn default_value(self, value: DefaultValue) -> Self {
        Self {
            default: Some(value),
            ..self
        }
    }
}
