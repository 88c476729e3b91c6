//! Scalar field types and field defaults

/// Storage type of a scalar field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// UTF-8 text
    String,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Boolean,
    /// UTC timestamp
    DateTime,
}

impl ScalarType {
    /// Returns the type name as used in error messages
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
        }
    }

    /// Whether `_avg` and `_sum` are defined for this type
    #[inline]
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Whether `_min` and `_max` are defined for this type
    #[inline]
    #[must_use]
    pub const fn is_orderable(&self) -> bool {
        !matches!(self, Self::Boolean)
    }

    /// Whether the string operators (`contains`, `startsWith`, `endsWith`) apply
    #[inline]
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::String)
    }
}

impl core::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value a field receives on create when the caller leaves it unset
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DefaultValue {
    /// A freshly generated v4 UUID rendered as a string
    Uuid,
    /// The current UTC time
    Now,
    /// A boolean literal
    Bool(bool),
    /// An integer literal
    Int(i64),
    /// A float literal
    Float(f64),
    /// A string literal
    Str(&'static str),
}
