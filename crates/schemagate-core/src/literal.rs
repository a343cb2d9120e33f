//! Rendering of schema-declared literals into DDL text, and comparison of
//! rendered expressions with what the catalog reports back.

use crate::schema::{IndexCondition, Literal};

/// Quotes a string literal, doubling embedded single quotes.
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn render(literal: &Literal) -> String {
    match literal {
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if f.is_nan() => "'NaN'".to_string(),
        Literal::Float(f) if f.is_infinite() => {
            if f.is_sign_positive() {
                "'Infinity'".to_string()
            } else {
                "'-Infinity'".to_string()
            }
        }
        Literal::Float(f) => format!("{f:?}"),
        Literal::Text(s) => quote(s),
        Literal::Json(value) => format!("{}::jsonb", quote(&value.to_string())),
        Literal::Now => "CURRENT_TIMESTAMP".to_string(),
        Literal::EmptyArray => "'{}'".to_string(),
    }
}

/// Renders the conjunction of partial-index conditions, parenthesized.
pub(crate) fn render_conditions(conditions: &[IndexCondition]) -> String {
    let parts: Vec<String> = conditions
        .iter()
        .map(|condition| {
            let field = crate::ident::Identifier::trusted(condition.field()).quoted();
            match condition {
                IndexCondition::Compare { op, value, .. } => {
                    format!("{field} {} {}", op.as_sql(), render(value))
                }
                IndexCondition::IsNull(_) => format!("{field} IS NULL"),
                IndexCondition::IsNotNull(_) => format!("{field} IS NOT NULL"),
            }
        })
        .collect();
    format!("({})", parts.join(" AND "))
}

/// Type names Postgres prints after `::` that contain spaces.
const MULTI_WORD_TYPES: [&str; 4] = [
    "timestamp with time zone",
    "timestamp without time zone",
    "character varying",
    "double precision",
];

/// Whether two SQL expressions denote the same default or predicate.
///
/// `declared` is what this crate renders; `catalog` is `pg_get_expr()` or
/// predicate output, which adds casts and parentheses, drops identifier
/// quotes, and quotes negative numbers.
pub(crate) fn equivalent(catalog: &str, declared: &str) -> bool {
    let (catalog, declared) = (normalize(catalog), normalize(declared));
    if catalog == declared {
        return true;
    }
    match (catalog.parse::<f64>(), declared.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.to_bits() == b.to_bits(),
        _ => false,
    }
}

/// Strips casts, parentheses, identifier quotes and whitespace, and
/// lowercases everything outside string literals.
fn normalize(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;
    while let Some(c) = rest.chars().next() {
        if c == '\'' {
            let (literal, tail) = split_literal(rest);
            out.push_str(&canonical_literal(literal, tail));
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("::") {
            rest = skip_type_name(tail);
        } else {
            if !(c.is_whitespace() || matches!(c, '(' | ')' | '"')) {
                out.extend(c.to_lowercase());
            }
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

/// Splits a leading `'...'` literal (with `''` escapes) off `text`.
fn split_literal(text: &str) -> (&str, &str) {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return text.split_at(i + 1);
        }
        i += 1;
    }
    (text, "")
}

/// Numbers lose their quotes and JSON documents are re-serialized, since the
/// catalog prints both in its own spelling.
fn canonical_literal(literal: &str, tail: &str) -> String {
    let inner = literal
        .strip_prefix('\'')
        .and_then(|l| l.strip_suffix('\''))
        .unwrap_or(literal);
    if inner.parse::<f64>().is_ok() {
        return inner.to_string();
    }
    let cast = tail.trim_start().to_ascii_lowercase();
    if cast.starts_with("::json") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&inner.replace("''", "'")) {
            return quote(&value.to_string());
        }
    }
    literal.to_string()
}

/// Skips a type name following `::`, including a type modifier and `[]`.
fn skip_type_name(text: &str) -> &str {
    let lower = text.to_ascii_lowercase();
    let len = MULTI_WORD_TYPES
        .iter()
        .find(|name| lower.starts_with(*name))
        .map_or_else(
            || {
                text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '"'))
                    .unwrap_or(text.len())
            },
            |name| name.len(),
        );
    let mut rest = &text[len..];
    if let Some(after) = rest.strip_prefix('(') {
        if let Some(close) = after.find(')') {
            if after[..close].chars().all(|c| c.is_ascii_digit() || c == ',') {
                rest = &after[close + 1..];
            }
        }
    }
    while let Some(after) = rest.strip_prefix("[]") {
        rest = after;
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Comparison;

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(render(&Literal::text("it's")), "'it''s'");
        assert_eq!(
            render(&Literal::text("'; DROP TABLE x; --")),
            "'''; DROP TABLE x; --'"
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(render(&Literal::Bool(false)), "FALSE");
        assert_eq!(render(&Literal::Int(-3)), "-3");
        assert_eq!(render(&Literal::Float(0.5)), "0.5");
        assert_eq!(render(&Literal::Float(f64::NAN)), "'NaN'");
        assert_eq!(render(&Literal::Now), "CURRENT_TIMESTAMP");
        assert_eq!(render(&Literal::EmptyArray), "'{}'");
    }

    #[test]
    fn test_json_is_cast() {
        let value = serde_json::json!({"a": "b'c"});
        assert_eq!(render(&Literal::Json(value)), r#"'{"a":"b''c"}'::jsonb"#);
    }

    #[test]
    fn test_conditions() {
        let rendered = render_conditions(&[
            IndexCondition::compare("a", Comparison::Gt, Literal::Int(3)),
            IndexCondition::eq("b", Literal::text("test")),
            IndexCondition::IsNotNull("c".into()),
        ]);
        assert_eq!(
            rendered,
            r#"("a" > 3 AND "b" = 'test' AND "c" IS NOT NULL)"#
        );
    }

    #[test]
    fn test_catalog_defaults_match_rendered_literals() {
        assert!(equivalent("0", &render(&Literal::Int(0))));
        assert!(equivalent("'-3'::integer", &render(&Literal::Int(-3))));
        assert!(equivalent("'0'::double precision", &render(&Literal::Float(0.0))));
        assert!(equivalent("'red'::text", &render(&Literal::text("red"))));
        assert!(equivalent(
            "'it''s'::character varying",
            &render(&Literal::text("it's"))
        ));
        assert!(equivalent("'{}'::text[]", &render(&Literal::EmptyArray)));
        assert!(equivalent("true", &render(&Literal::Bool(true))));
        assert!(equivalent("CURRENT_TIMESTAMP", &render(&Literal::Now)));
        assert!(equivalent(
            r#"'{"a": 1, "b": [true]}'::jsonb"#,
            &render(&Literal::Json(serde_json::json!({"b": [true], "a": 1})))
        ));
    }

    #[test]
    fn test_changed_defaults_differ() {
        assert!(!equivalent("0", &render(&Literal::Int(5))));
        assert!(!equivalent("'Red'::text", &render(&Literal::text("red"))));
        assert!(!equivalent("false", &render(&Literal::Bool(true))));
        assert!(!equivalent(
            r#"'{"a": 1}'::jsonb"#,
            &render(&Literal::Json(serde_json::json!({"a": 2})))
        ));
    }

    #[test]
    fn test_catalog_predicates_match_rendered_conditions() {
        let declared = render_conditions(&[
            IndexCondition::compare("baseScore", Comparison::Gt, Literal::Float(0.5)),
            IndexCondition::eq("title", Literal::text("test")),
            IndexCondition::IsNotNull("c".into()),
        ]);
        assert!(equivalent(
            r#"((("baseScore" > (0.5)::double precision) AND ((title)::text = 'test'::text)) AND (c IS NOT NULL))"#,
            &declared
        ));
        assert!(!equivalent(
            r#"(("baseScore" > (0.5)::double precision) AND (c IS NOT NULL))"#,
            &declared
        ));
    }
}
