//! Validated SQL identifiers.

use std::fmt;

use crate::error::SchemaError;

/// Longest identifier Postgres keeps without truncation (`NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A table, column, index or extension name that is safe to quote.
///
/// Outside this crate an `Identifier` can only be obtained through
/// [`Identifier::new`]; names taken from a built [`TableSpec`](crate::schema::TableSpec)
/// were checked when the table was built. It is always emitted double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validates `name` as a Postgres identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] when the name is empty,
    /// longer than [`MAX_IDENTIFIER_LEN`] bytes, or contains a control
    /// character. Names also end up in generated source comments, where a
    /// line break would end the comment.
    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("identifier is empty")
        } else if name.len() > MAX_IDENTIFIER_LEN {
            Some("identifier is longer than 63 bytes")
        } else if name.chars().any(char::is_control) {
            Some("identifier contains a control character")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(SchemaError::InvalidIdentifier { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Wraps a name that was already validated as part of a built table.
    pub(crate) fn trusted(name: &str) -> Self {
        Self(name.to_string())
    }

    /// The unquoted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as it appears in SQL: double-quoted, with embedded quotes doubled.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = SchemaError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting_preserves_case() {
        let ident = Identifier::new("TestCollection").unwrap();
        assert_eq!(ident.quoted(), "\"TestCollection\"");
    }

    #[test]
    fn test_embedded_quote_is_doubled() {
        let ident = Identifier::new("we\"ird").unwrap();
        assert_eq!(ident.quoted(), "\"we\"\"ird\"");
    }

    #[test]
    fn test_rejects_empty_and_long_names() {
        assert!(Identifier::new("").is_err());
        assert!(Identifier::new("a".repeat(64)).is_err());
        assert!(Identifier::new("a".repeat(63)).is_ok());
        assert!(Identifier::new("a\0b").is_err());
    }

    #[test]
    fn test_rejects_control_characters() {
        for name in ["a\nb", "a\rb", "a\tb", "a\u{1b}b", "a\u{85}b"] {
            let err = Identifier::new(name).unwrap_err();
            assert!(err.to_string().contains("control character"), "{err}");
        }
        assert!(Identifier::new("naïve name").is_ok());
    }
}
