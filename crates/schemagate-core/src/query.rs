//! Token-based queries and their compilation to `{sql, args}`.
//!
//! A [`Query`] is an ordered list of [`Token`]s. Compilation renders raw
//! fragments verbatim, quotes identifiers, and replaces every parameter with a
//! positional placeholder (`$1`, `$2`, ...) whose value goes to `args`.
//!
//! Callers can only add raw SQL as `&'static str`, so runtime strings cannot
//! reach the SQL text except as quoted identifiers or bind parameters:
//!
//! ```rust
//! use schemagate_core::ident::Identifier;
//! use schemagate_core::query::Query;
//!
//! let posts = Identifier::new("Posts").unwrap();
//! let compiled = Query::new()
//!     .raw("UPDATE")
//!     .ident(&posts)
//!     .raw("SET \"draft\" = FALSE WHERE \"userId\" =")
//!     .param("abc")
//!     .compile();
//!
//! assert_eq!(compiled.sql, r#"UPDATE "Posts" SET "draft" = FALSE WHERE "userId" = $1"#);
//! assert_eq!(compiled.args.len(), 1);
//! ```

use std::borrow::Cow;
use std::fmt;

use crate::ident::Identifier;
use crate::value::{SqlValue, ToSqlValue};

/// A raw SQL fragment.
///
/// Public code can only create one from a `&'static str`; owned fragments
/// (column types, escaped schema literals) are produced inside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSql(Cow<'static, str>);

impl RawSql {
    pub(crate) fn owned(sql: String) -> Self {
        Self(Cow::Owned(sql))
    }

    /// The fragment text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for RawSql {
    fn from(sql: &'static str) -> Self {
        Self(Cow::Borrowed(sql))
    }
}

/// One element of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// SQL text emitted as-is.
    Raw(RawSql),
    /// A quoted identifier.
    Ident(Identifier),
    /// A bound value, emitted as `$n`.
    Param(SqlValue),
}

/// An ordered sequence of tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    tokens: Vec<Token>,
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Appends a static SQL fragment.
    #[must_use]
    pub fn raw(mut self, sql: &'static str) -> Self {
        self.tokens.push(Token::Raw(RawSql::from(sql)));
        self
    }

    /// Appends a quoted identifier.
    #[must_use]
    pub fn ident(mut self, ident: &Identifier) -> Self {
        self.tokens.push(Token::Ident(ident.clone()));
        self
    }

    /// Appends a bind parameter.
    #[must_use]
    pub fn param(mut self, value: impl ToSqlValue) -> Self {
        self.tokens.push(Token::Param(value.to_sql_value()));
        self
    }

    /// Appends every token of `other`.
    #[must_use]
    pub fn append(mut self, other: Self) -> Self {
        self.tokens.extend(other.tokens);
        self
    }

    pub(crate) fn fragment(mut self, sql: String) -> Self {
        self.tokens.push(Token::Raw(RawSql::owned(sql)));
        self
    }

    /// The tokens, in order.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// `true` if the query has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Renders the query.
    ///
    /// Tokens are separated by a single space, except that no space follows
    /// `(` and none precedes `)` or `,`.
    #[must_use]
    pub fn compile(&self) -> CompiledQuery {
        let mut sql = String::new();
        let mut args = Vec::new();

        for token in &self.tokens {
            let piece: Cow<'_, str> = match token {
                Token::Raw(raw) => Cow::Borrowed(raw.as_str()),
                Token::Ident(ident) => Cow::Owned(ident.quoted()),
                Token::Param(value) => {
                    args.push(value.clone());
                    Cow::Owned(format!("${}", args.len()))
                }
            };
            if piece.is_empty() {
                continue;
            }
            if !sql.is_empty()
                && !sql.ends_with('(')
                && !piece.starts_with(')')
                && !piece.starts_with(',')
            {
                sql.push(' ');
            }
            sql.push_str(&piece);
        }

        CompiledQuery { sql, args }
    }
}

/// A compiled query: SQL text with `$n` placeholders plus the bound values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    /// SQL text.
    pub sql: String,
    /// Values for `$1..$n`, in order.
    pub args: Vec<SqlValue>,
}

impl CompiledQuery {
    /// A statement without parameters.
    #[must_use]
    pub fn unparameterized(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
