//! Migration file writer.
//!
//! Renders a [`GeneratedMigration`] as a Rust module exporting a
//! [`StaticMigration`](crate::migration::StaticMigration) constant named
//! `MIGRATION`, with the SQL frozen as raw string literals.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{MigrateError, Result};
use crate::migration::GeneratedMigration;

/// Writes generated migrations as Rust source files.
#[derive(Debug, Clone, Copy)]
pub struct MigrationWriter<'a> {
    migration: &'a GeneratedMigration,
}

impl<'a> MigrationWriter<'a> {
    /// Creates a writer for `migration`.
    #[must_use]
    pub const fn new(migration: &'a GeneratedMigration) -> Self {
        Self { migration }
    }

    /// Module name, e.g. `m20261018t120000_add_widgets`.
    #[must_use]
    pub fn module_name(&self) -> String {
        let mut module = String::from("m");
        for ch in self.migration.name.chars() {
            if ch.is_ascii_alphanumeric() {
                module.push(ch.to_ascii_lowercase());
            } else {
                module.push('_');
            }
        }
        module
    }

    /// File name, `<module_name>.rs`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.rs", self.module_name())
    }

    /// Renders the Rust source.
    #[must_use]
    pub fn render(&self) -> String {
        let migration = self.migration;

        let mut header = format!(
            "//! Generated migration `{}`.\n",
            comment_line(&migration.name)
        );
        header.push_str("//!\n//! Changes:\n");
        for change in &migration.changes {
            header.push_str(&format!("//! - {}\n", comment_line(change)));
        }
        if !migration.irreversible.is_empty() {
            header.push_str("//!\n//! Not reversible:\n");
            for change in &migration.irreversible {
                header.push_str(&format!("//! - {}\n", comment_line(change)));
            }
        }

        let up = render_statements(migration.up.iter().map(|q| q.sql.as_str()), 2);
        let down = migration.down.as_ref().map_or_else(
            || "None".to_string(),
            |down| {
                format!(
                    "Some(&[\n{}\x20   ])",
                    render_statements(down.iter().map(|q| q.sql.as_str()), 2)
                )
            },
        );

        format!(
            "{header}\
             \n\
             use schemagate_migrate::migration::StaticMigration;\n\
             \n\
             pub const MIGRATION: StaticMigration = StaticMigration {{\n\
             \x20   name: {name:?},\n\
             \x20   accepts_schema_hash: Some({hash:?}),\n\
             \x20   up: &[\n\
             {up}\
             \x20   ],\n\
             \x20   down: {down},\n\
             }};\n",
            name = migration.name,
            hash = migration.accepts_schema_hash,
        )
    }

    /// Writes the file into `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// [`MigrateError::MigrationExists`] if the file is already there, or an
    /// IO error.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        if path.exists() {
            return Err(MigrateError::MigrationExists(path));
        }
        fs::write(&path, self.render())?;
        info!(path = %path.display(), "Created migration");
        Ok(path)
    }
}

/// Keeps `text` on one doc-comment line.
fn comment_line(text: &str) -> String {
    text.replace(char::is_control, " ")
}

fn render_statements<'s>(statements: impl Iterator<Item = &'s str>, depth: usize) -> String {
    let indent = "    ".repeat(depth);
    statements
        .map(|sql| format!("{indent}{},\n", raw_string(sql)))
        .collect()
}

/// `sql` as a raw string literal with enough `#`s to hold it.
fn raw_string(sql: &str) -> String {
    let mut longest = 0;
    let mut run: Option<usize> = None;
    for ch in sql.chars() {
        run = match (ch, run) {
            ('"', _) => Some(0),
            ('#', Some(n)) => Some(n + 1),
            _ => None,
        };
        if let Some(n) = run {
            longest = longest.max(n);
        }
    }
    let hashes = "#".repeat(longest + 1);
    format!("r{hashes}\"{sql}\"{hashes}")
}
