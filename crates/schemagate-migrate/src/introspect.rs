//! Reads a [`LiveSchema`] snapshot from the Postgres catalogs.
//!
//! Column types come from `format_type()`, so they compare directly with
//! [`FieldType::catalog_type`](schemagate_core::schema::FieldType::catalog_type).
//! Defaults and partial-index predicates come from `pg_get_expr()`. Index key
//! columns are read by name, in key order. Primary-key indexes are left out;
//! the table definition owns them.

use schemagate_core::live::{LiveColumn, LiveIndex, LiveSchema};
use schemagate_core::Query;
use tracing::debug;

use crate::client::{ClientError, Row, SqlClient};
use crate::error::Result;

/// Reads tables, columns, indexes and extensions of one Postgres schema.
///
/// # Errors
///
/// Propagates client errors, and fails on names that are not valid
/// identifiers.
pub async fn introspect(client: &dyn SqlClient, pg_schema: &str) -> Result<LiveSchema> {
    let mut live = LiveSchema::new();

    let tables = Query::new()
        .raw(
            "SELECT c.relname::text AS table_name FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relkind = 'r' AND n.nspname =",
        )
        .param(pg_schema)
        .raw("ORDER BY c.relname");
    for row in client.execute_any(&tables.compile()).await? {
        live.table_entry(row.text("table_name")?)?;
    }

    let columns = Query::new()
        .raw(
            "SELECT c.relname::text AS table_name, a.attname::text AS column_name, \
             format_type(a.atttypid, a.atttypmod) AS data_type, \
             NOT a.attnotnull AS nullable, \
             pg_get_expr(d.adbin, d.adrelid) AS default_expr \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relkind = 'r' AND a.attnum > 0 AND NOT a.attisdropped AND n.nspname =",
        )
        .param(pg_schema)
        .raw("ORDER BY c.relname, a.attnum");
    for row in client.execute_any(&columns.compile()).await? {
        let column = LiveColumn::new(
            row.text("column_name")?,
            row.text("data_type")?,
            row.bool("nullable")?,
            row.optional_text("default_expr")?,
        )?;
        live.add_column(row.text("table_name")?, column)?;
    }

    let indexes = Query::new()
        .raw(
            "SELECT t.relname::text AS table_name, i.relname::text AS index_name, \
             pg_get_indexdef(x.indexrelid) AS definition, \
             x.indisunique AS is_unique, am.amname::text AS method, \
             pg_get_expr(x.indpred, x.indrelid) AS predicate, \
             COALESCE((SELECT jsonb_agg(a.attname::text ORDER BY k.ord) \
                 FROM unnest(x.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
                 JOIN pg_attribute a ON a.attrelid = x.indrelid AND a.attnum = k.attnum \
                 WHERE k.ord <= x.indnkeyatts), '[]'::jsonb) AS columns \
             FROM pg_index x \
             JOIN pg_class i ON i.oid = x.indexrelid \
             JOIN pg_class t ON t.oid = x.indrelid \
             JOIN pg_am am ON am.oid = i.relam \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             WHERE NOT x.indisprimary AND n.nspname =",
        )
        .param(pg_schema)
        .raw("ORDER BY t.relname, i.relname");
    for row in client.execute_any(&indexes.compile()).await? {
        let index = LiveIndex::new(row.text("index_name")?, row.text("definition")?)?
            .unique(row.bool("is_unique")?)
            .using(row.text("method")?)
            .columns(index_columns(&row)?)
            .predicate(row.optional_text("predicate")?);
        live.add_index(row.text("table_name")?, index)?;
    }

    let extensions = Query::new().raw("SELECT extname::text AS name FROM pg_extension");
    for row in client.execute_any(&extensions.compile()).await? {
        live.add_extension(row.text("name")?);
    }

    debug!(
        tables = live.tables.len(),
        extensions = live.extensions.len(),
        "Introspected database"
    );
    Ok(live)
}

fn index_columns(row: &Row) -> Result<Vec<String>> {
    let columns = row.json("columns")?;
    let names = columns.as_array().ok_or_else(|| ClientError::Decode {
        column: "columns".to_string(),
        message: "expected a JSON array of column names".to_string(),
    })?;
    Ok(names
        .iter()
        .filter_map(|name| name.as_str().map(str::to_string))
        .collect())
}
