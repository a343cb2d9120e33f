//! Field declarations and the column-type mapping.

use std::fmt;

/// Scalar column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Unbounded text.
    Text,
    /// Length-limited text.
    Varchar(u32),
    /// Document id (`VARCHAR(27)`).
    Id,
    /// 32-bit integer.
    Integer,
    /// Double-precision float.
    Float,
    /// Boolean.
    Boolean,
    /// Timestamp with time zone.
    Timestamp,
    /// Raw bytes.
    Binary,
}

/// Width of generated document ids; foreign keys share it.
pub const ID_LENGTH: u32 = 27;

/// The declared type of a field.
///
/// A closed set: every variant has exactly one column type, so the mapping
/// from declaration to DDL is total.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A scalar column.
    Scalar(ScalarKind),
    /// A `JSONB` document.
    Json,
    /// A pgvector embedding with a fixed number of dimensions.
    Vector(u32),
    /// A one-dimensional array of another type.
    Array(Box<FieldType>),
    /// An id referencing a row of another table.
    ForeignKey(String),
}

impl FieldType {
    /// `TEXT`.
    #[must_use]
    pub const fn text() -> Self {
        Self::Scalar(ScalarKind::Text)
    }

    /// `VARCHAR(len)`.
    #[must_use]
    pub const fn varchar(len: u32) -> Self {
        Self::Scalar(ScalarKind::Varchar(len))
    }

    /// `VARCHAR(27)` document id.
    #[must_use]
    pub const fn id() -> Self {
        Self::Scalar(ScalarKind::Id)
    }

    /// `INTEGER`.
    #[must_use]
    pub const fn integer() -> Self {
        Self::Scalar(ScalarKind::Integer)
    }

    /// `DOUBLE PRECISION`.
    #[must_use]
    pub const fn float() -> Self {
        Self::Scalar(ScalarKind::Float)
    }

    /// `BOOL`.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Scalar(ScalarKind::Boolean)
    }

    /// `TIMESTAMPTZ`.
    #[must_use]
    pub const fn timestamp() -> Self {
        Self::Scalar(ScalarKind::Timestamp)
    }

    /// `BYTEA`.
    #[must_use]
    pub const fn binary() -> Self {
        Self::Scalar(ScalarKind::Binary)
    }

    /// `JSONB`.
    #[must_use]
    pub const fn json() -> Self {
        Self::Json
    }

    /// `VECTOR(dimensions)`.
    #[must_use]
    pub const fn vector(dimensions: u32) -> Self {
        Self::Vector(dimensions)
    }

    /// `<inner>[]`.
    #[must_use]
    pub fn array(inner: Self) -> Self {
        Self::Array(Box::new(inner))
    }

    /// Reference to another table's id.
    #[must_use]
    pub fn foreign_key(table: impl Into<String>) -> Self {
        Self::ForeignKey(table.into())
    }

    /// The type as written in DDL.
    #[must_use]
    pub fn column_type(&self) -> String {
        match self {
            Self::Scalar(kind) => match kind {
                ScalarKind::Text => "TEXT".to_string(),
                ScalarKind::Varchar(len) => format!("VARCHAR({len})"),
                ScalarKind::Id => format!("VARCHAR({ID_LENGTH})"),
                ScalarKind::Integer => "INTEGER".to_string(),
                ScalarKind::Float => "DOUBLE PRECISION".to_string(),
                ScalarKind::Boolean => "BOOL".to_string(),
                ScalarKind::Timestamp => "TIMESTAMPTZ".to_string(),
                ScalarKind::Binary => "BYTEA".to_string(),
            },
            Self::Json => "JSONB".to_string(),
            Self::Vector(dimensions) => format!("VECTOR({dimensions})"),
            Self::Array(inner) => format!("{}[]", inner.column_type()),
            Self::ForeignKey(_) => format!("VARCHAR({ID_LENGTH})"),
        }
    }

    /// The type as Postgres' `format_type()` reports it for a live column.
    #[must_use]
    pub fn catalog_type(&self) -> String {
        match self {
            Self::Scalar(kind) => match kind {
                ScalarKind::Text => "text".to_string(),
                ScalarKind::Varchar(len) => format!("character varying({len})"),
                ScalarKind::Id => format!("character varying({ID_LENGTH})"),
                ScalarKind::Integer => "integer".to_string(),
                ScalarKind::Float => "double precision".to_string(),
                ScalarKind::Boolean => "boolean".to_string(),
                ScalarKind::Timestamp => "timestamp with time zone".to_string(),
                ScalarKind::Binary => "bytea".to_string(),
            },
            Self::Json => "jsonb".to_string(),
            Self::Vector(dimensions) => format!("vector({dimensions})"),
            Self::Array(inner) => format!("{}[]", inner.catalog_type()),
            Self::ForeignKey(_) => format!("character varying({ID_LENGTH})"),
        }
    }

    /// Parses a `format_type()` spelling back into a field type.
    ///
    /// Returns `None` for types this model cannot declare. `character
    /// varying(27)` parses as [`ScalarKind::Id`] since the catalog cannot tell
    /// ids, foreign keys and plain varchars of that width apart.
    #[must_use]
    pub fn from_catalog(spelling: &str) -> Option<Self> {
        let spelling = spelling.trim();
        if let Some(inner) = spelling.strip_suffix("[]") {
            let inner = Self::from_catalog(inner)?;
            return match inner {
                Self::Array(_) | Self::Vector(_) => None,
                inner => Some(Self::array(inner)),
            };
        }
        if let Some(len) = parenthesized(spelling, "character varying") {
            return Some(if len == ID_LENGTH {
                Self::id()
            } else {
                Self::varchar(len)
            });
        }
        if let Some(dimensions) = parenthesized(spelling, "vector") {
            return Some(Self::vector(dimensions));
        }
        match spelling {
            "text" => Some(Self::text()),
            "integer" => Some(Self::integer()),
            "double precision" => Some(Self::float()),
            "boolean" => Some(Self::boolean()),
            "timestamp with time zone" => Some(Self::timestamp()),
            "bytea" => Some(Self::binary()),
            "jsonb" => Some(Self::json()),
            _ => None,
        }
    }

    /// Extension that must be installed before a column of this type exists.
    #[must_use]
    pub fn required_extension(&self) -> Option<&'static str> {
        match self {
            Self::Vector(_) => Some("vector"),
            Self::Array(inner) => inner.required_extension(),
            _ => None,
        }
    }

    /// `true` for JSONB columns, which are indexed with GIN.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }

    /// Why this type cannot be declared, if it cannot.
    pub(crate) fn invalid_reason(&self) -> Option<&'static str> {
        match self {
            Self::Scalar(ScalarKind::Varchar(0)) => Some("VARCHAR length must be positive"),
            Self::Vector(0) => Some("vector dimensions must be positive"),
            Self::Array(inner) => match inner.as_ref() {
                Self::Array(_) => Some("nested arrays are not supported"),
                Self::Vector(_) => Some("arrays of vectors are not supported"),
                inner => inner.invalid_reason(),
            },
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column_type())
    }
}

/// Parses `"<prefix>(<n>)"`.
fn parenthesized(spelling: &str, prefix: &str) -> Option<u32> {
    spelling
        .strip_prefix(prefix)?
        .strip_prefix('(')?
        .strip_suffix(')')?
        .parse()
        .ok()
}

/// A typed literal that the schema embeds in DDL: column defaults and
/// partial-index predicates.
///
/// DDL statements cannot take bind parameters, so these are the only values
/// ever rendered into SQL text. Rendering escapes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `TRUE` / `FALSE`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Quoted string literal.
    Text(String),
    /// Quoted JSON document cast to `jsonb`.
    Json(serde_json::Value),
    /// `CURRENT_TIMESTAMP`.
    Now,
    /// An empty array (`'{}'`).
    EmptyArray,
}

impl Literal {
    /// Shorthand for [`Literal::Text`].
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: String,
    field_type: FieldType,
    nullable: bool,
    default: Option<Literal>,
}

impl FieldSpec {
    /// Declares a nullable field without a default.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            default: None,
        }
    }

    /// Marks the field `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column default.
    #[must_use]
    pub fn with_default(mut self, value: Literal) -> Self {
        self.default = Some(value);
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    #[must_use]
    pub const fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Whether the column accepts NULL.
    #[must_use]
    pub const fn nullable(&self) -> bool {
        self.nullable
    }

    /// Declared default, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Literal> {
        self.default.as_ref()
    }

    /// Whether a default is declared.
    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }
}
