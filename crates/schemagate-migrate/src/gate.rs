//! Offline check that every schema change came with a migration.
//!
//! The most recently authored migration that declares an
//! `accepts_schema_hash` names the schema it expects. If the schema in code
//! hashes to something else, [`AcceptanceGate::check`] fails and writes
//! `pending_schema_diff.txt` next to the accepted snapshot so the author can
//! see what changed. Nothing here touches a database.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use schemagate_core::hash::canonical_text;
use schemagate_core::{Schema, SchemaHash};
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::migration::MigrationSet;

/// Snapshot of the last accepted canonical schema text.
pub const ACCEPTED_SCHEMA_FILE: &str = "accepted_schema.txt";

/// Written when the gate fails.
pub const PENDING_DIFF_FILE: &str = "pending_schema_diff.txt";

const HASH_HEADER: &str = "-- hash: ";

/// Compares the schema in code with what the migrations accept.
#[derive(Debug)]
pub struct AcceptanceGate<'a> {
    schema: &'a Schema,
    migrations: &'a MigrationSet,
    dir: PathBuf,
}

impl<'a> AcceptanceGate<'a> {
    /// A gate keeping its files in `dir`.
    pub fn new(schema: &'a Schema, migrations: &'a MigrationSet, dir: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            migrations,
            dir: dir.into(),
        }
    }

    /// Path of the accepted snapshot.
    #[must_use]
    pub fn accepted_path(&self) -> PathBuf {
        self.dir.join(ACCEPTED_SCHEMA_FILE)
    }

    /// Path of the pending-diff artifact.
    #[must_use]
    pub fn pending_path(&self) -> PathBuf {
        self.dir.join(PENDING_DIFF_FILE)
    }

    /// Passes if the latest declared hash matches the schema.
    ///
    /// On pass a stale pending-diff artifact is removed. On failure the
    /// artifact is (re)written.
    ///
    /// # Errors
    ///
    /// [`MigrateError::SchemaHashMismatch`] on failure, or an IO error while
    /// handling the artifact files.
    pub fn check(&self) -> Result<SchemaHash> {
        let actual = SchemaHash::compute(self.schema);
        let accepted = self.migrations.latest_accepted_hash();

        if let Some((migration, expected)) = accepted {
            if actual.matches(expected) {
                remove_if_exists(&self.pending_path())?;
                info!(hash = %actual, migration = %migration, "Schema hash accepted");
                return Ok(actual);
            }
        }

        let artifact = self.pending_path();
        let (migration, expected) = match accepted {
            Some((migration, expected)) => (Some(migration.to_string()), Some(expected.to_string())),
            None => (None, None),
        };
        let report = self.pending_report(&actual, expected.as_deref(), migration.as_deref())?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&artifact, report)?;
        warn!(
            actual = %actual,
            expected = expected.as_deref().unwrap_or("none"),
            artifact = %artifact.display(),
            "Schema changed without a migration"
        );

        Err(MigrateError::SchemaHashMismatch {
            expected,
            actual: actual.to_string(),
            migration,
            artifact,
        })
    }

    /// Checks, then records the current schema as accepted.
    ///
    /// # Errors
    ///
    /// Same as [`check`](Self::check).
    pub fn accept(&self) -> Result<SchemaHash> {
        let hash = self.check()?;
        write_snapshot(&self.dir, self.schema)?;
        Ok(hash)
    }

    fn pending_report(
        &self,
        actual: &SchemaHash,
        expected: Option<&str>,
        migration: Option<&str>,
    ) -> Result<String> {
        let accepted_text = read_snapshot(&self.dir)?.unwrap_or_default();
        let current_text = canonical_text(self.schema);

        let mut report = String::from("# The schema changed but no migration accepts it.\n");
        match (expected, migration) {
            (Some(expected), Some(migration)) => {
                report.push_str(&format!("# expected: {expected} (migration {migration})\n"));
            }
            _ => report.push_str("# expected: none (no migration declares a schema hash)\n"),
        }
        report.push_str(&format!("# actual:   {actual}\n"));
        report.push_str(&format!(
            "# Add a migration that accepts {actual}, e.g. with `generate`.\n"
        ));
        report.push_str(&format!("--- {ACCEPTED_SCHEMA_FILE}\n+++ schema in code\n"));
        report.push_str(&line_diff(&accepted_text, &current_text));
        Ok(report)
    }
}

/// Writes `accepted_schema.txt` for `schema` into `dir`.
///
/// # Errors
///
/// Returns an IO error if the directory or file cannot be written.
pub fn write_snapshot(dir: &Path, schema: &Schema) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(ACCEPTED_SCHEMA_FILE);
    let text = format!(
        "{HASH_HEADER}{}\n{}",
        SchemaHash::compute(schema),
        canonical_text(schema)
    );
    fs::write(&path, text)?;
    info!(path = %path.display(), "Wrote accepted schema snapshot");
    Ok(path)
}

/// Canonical text of the accepted snapshot in `dir`, without its header.
///
/// # Errors
///
/// Returns an IO error other than the file not existing.
pub fn read_snapshot(dir: &Path) -> Result<Option<String>> {
    let text = match fs::read_to_string(dir.join(ACCEPTED_SCHEMA_FILE)) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let body = match text.split_once('\n') {
        Some((first, rest)) if first.starts_with(HASH_HEADER) => rest.to_string(),
        _ => text,
    };
    Ok(Some(body))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed stale pending schema diff");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Line diff from `old` to `new`: unchanged lines start with a space,
/// removed ones with `-`, added ones with `+`.
#[must_use]
pub fn line_diff(old: &str, new: &str) -> String {
    let old: Vec<&str> = old.lines().collect();
    let new: Vec<&str> = new.lines().collect();

    // lcs[i][j]: longest common subsequence of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            out.push_str(&format!(" {}\n", old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push_str(&format!("-{}\n", old[i]));
            i += 1;
        } else {
            out.push_str(&format!("+{}\n", new[j]));
            j += 1;
        }
    }
    for line in &old[i..] {
        out.push_str(&format!("-{line}\n"));
    }
    for line in &new[j..] {
        out.push_str(&format!("+{line}\n"));
    }
    out
}
