//! Index declarations.

use super::field::Literal;

/// Access method of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexMethod {
    /// B-tree (Postgres' default).
    BTree,
    /// GIN, used for JSONB columns.
    Gin,
}

impl IndexMethod {
    /// The method as written after `USING`.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::BTree => "btree",
            Self::Gin => "gin",
        }
    }
}

/// Comparison operator of a partial-index condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl Comparison {
    /// The operator as written in SQL.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// One conjunct of a partial index's `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCondition {
    /// `"field" <op> <literal>`
    Compare {
        /// Field being compared.
        field: String,
        /// Operator.
        op: Comparison,
        /// Right-hand side.
        value: Literal,
    },
    /// `"field" IS NULL`
    IsNull(String),
    /// `"field" IS NOT NULL`
    IsNotNull(String),
}

impl IndexCondition {
    /// `"field" = value`.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Literal) -> Self {
        Self::Compare {
            field: field.into(),
            op: Comparison::Eq,
            value,
        }
    }

    /// `"field" <op> value`.
    #[must_use]
    pub fn compare(field: impl Into<String>, op: Comparison, value: Literal) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    /// The field this condition reads.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Compare { field, .. } | Self::IsNull(field) | Self::IsNotNull(field) => field,
        }
    }
}

/// A named, ordered index over one or more fields of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    name: String,
    columns: Vec<String>,
    unique: bool,
    conditions: Vec<IndexCondition>,
    method: Option<IndexMethod>,
}

impl IndexSpec {
    /// Declares a non-unique index with an explicit name.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            conditions: Vec::new(),
            method: None,
        }
    }

    /// Declares an index named `idx_<table>_<col>_<col>...`.
    #[must_use]
    pub fn for_columns<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = format!("idx_{table}_{}", columns.join("_"));
        Self::new(name, columns)
    }

    /// Makes the index `UNIQUE`.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds a partial-index condition; conditions are joined with `AND`.
    #[must_use]
    pub fn condition(mut self, condition: IndexCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Forces an access method instead of deriving it from the column types.
    #[must_use]
    pub fn using(mut self, method: IndexMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed columns, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the index is `UNIQUE`.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Partial-index conditions.
    #[must_use]
    pub fn conditions(&self) -> &[IndexCondition] {
        &self.conditions
    }

    /// Access method. Resolved when the owning table is built.
    #[must_use]
    pub fn method(&self) -> IndexMethod {
        self.method.unwrap_or(IndexMethod::BTree)
    }

    pub(crate) const fn explicit_method(&self) -> Option<IndexMethod> {
        self.method
    }

    pub(crate) fn resolve_method(&mut self, method: IndexMethod) {
        self.method = Some(method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_name() {
        let index = IndexSpec::for_columns("TestCollection", ["a", "b"]);
        assert_eq!(index.name(), "idx_TestCollection_a_b");
        assert_eq!(index.columns(), ["a", "b"]);
        assert!(!index.is_unique());
        assert_eq!(index.method(), IndexMethod::BTree);
    }

    #[test]
    fn test_condition_field() {
        let condition = IndexCondition::compare("a", Comparison::Gt, Literal::Int(3));
        assert_eq!(condition.field(), "a");
        assert_eq!(IndexCondition::IsNull("b".into()).field(), "b");
    }
}
