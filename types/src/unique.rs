//! Compound unique constraint definitions

/// Const-friendly unique constraint definition
///
/// Used for multi-field unique constraints (single-field UNIQUEs are on the field).
///
/// # Examples
///
/// ```
/// use neuronek_db_types::UniqueDef;
///
/// const UNIQ: UniqueDef = UniqueDef::new("name_substanceName", &["name", "substanceName"]);
/// assert_eq!(UNIQ.fields.len(), 2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniqueDef {
    /// Constraint name, also the key of the compound selector in `where` inputs
    pub name: &'static str,
    /// Fields covered by the constraint
    pub fields: &'static [&'static str],
}

impl UniqueDef {
    /// Create a new unique constraint definition
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields }
    }
}
