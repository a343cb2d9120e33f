//! Command-line front end shared by every schema crate.
//!
//! A project binary declares its [`Schema`] and [`MigrationSet`] and hands
//! them to [`run`]:
//!
//! ```rust,no_run
//! use schemagate_core::Schema;
//! use schemagate_migrate::migration::MigrationSet;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     schemagate_migrate::cli::run(Schema::default(), MigrationSet::default()).await
//! }
//! ```
//!
//! `hash`, `check`, `accept` and `sql` work offline and never connect.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use schemagate_core::hash::canonical_text;
use schemagate_core::{Schema, SchemaHash};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::client::PgClient;
use crate::gate::{self, AcceptanceGate};
use crate::generator::DiffGenerator;
use crate::history::SqlHistoryStore;
use crate::introspect::introspect;
use crate::migration::MigrationSet;
use crate::runner::{self, Direction, MigrationRunner, Resolution};
use crate::writer::MigrationWriter;

/// Ordered, transactional Postgres migrations with a schema-hash gate.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Connection pool size.
    #[arg(long, env = "PG_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Queries slower than this are reported (milliseconds, 0 disables).
    #[arg(long, env = "SLOW_QUERY_REPORT_CUTOFF_MS", default_value_t = 2000)]
    pub slow_query_ms: u64,

    /// Postgres schema to introspect.
    #[arg(long, default_value = "public")]
    pub pg_schema: String,

    /// Directory holding the accepted schema snapshot and pending diff.
    #[arg(long, default_value = "schema")]
    pub schema_dir: PathBuf,

    /// Directory generated migrations are written to.
    #[arg(short, long, default_value = "migrations")]
    pub migrations_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the migration history table.
    Init,

    /// Apply every pending migration, in order.
    Migrate {
        /// Print the SQL instead of executing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply one migration.
    Apply {
        /// Migration name.
        name: String,
    },

    /// Show every migration and its state.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Undo one applied migration.
    Rollback {
        /// Migration name.
        name: String,

        /// Print the SQL instead of executing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Settle a failed or incomplete migration.
    Resolve {
        /// Migration name.
        name: String,

        /// What to do with it.
        #[arg(value_enum)]
        resolution: ResolutionArg,
    },

    /// Print a migration's SQL without connecting.
    Sql {
        /// Migration name.
        name: String,

        /// Print the rollback SQL.
        #[arg(short, long)]
        reverse: bool,
    },

    /// Print the schema hash.
    Hash {
        /// Print the canonical text instead.
        #[arg(long)]
        canonical: bool,
    },

    /// Fail if the schema changed without a migration accepting it.
    Check,

    /// Check, then record the schema as accepted.
    Accept,

    /// Generate a migration converging the database to the schema.
    Generate {
        /// Migration description.
        #[arg(short, long)]
        name: Option<String>,

        /// Print the migration instead of writing it.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Command-line spelling of [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    /// The change was completed by hand.
    MarkSucceeded,
    /// Run the migration again.
    Retry,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::MarkSucceeded => Self::MarkSucceeded,
            ResolutionArg::Retry => Self::Retry,
        }
    }
}

/// Parses the command line, sets up logging and runs the command.
///
/// # Errors
///
/// Any failure of the command; the process then exits non-zero.
pub async fn run(schema: Schema, migrations: MigrationSet) -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    cli.execute(schema, migrations).await
}

impl Cli {
    /// Runs the parsed command.
    ///
    /// # Errors
    ///
    /// Any failure of the command.
    pub async fn execute(self, schema: Schema, migrations: MigrationSet) -> anyhow::Result<()> {
        match self.command {
            Commands::Hash { canonical } => {
                if canonical {
                    print!("{}", canonical_text(&schema));
                } else {
                    println!("{}", SchemaHash::compute(&schema));
                }
            }

            Commands::Check => {
                let hash = AcceptanceGate::new(&schema, &migrations, &self.schema_dir).check()?;
                println!("Schema hash {hash} is accepted.");
            }

            Commands::Accept => {
                let hash = AcceptanceGate::new(&schema, &migrations, &self.schema_dir).accept()?;
                println!("Accepted schema hash {hash}.");
            }

            Commands::Sql { ref name, reverse } => {
                let migration = migrations.require(name)?;
                let direction = if reverse {
                    Direction::Down
                } else {
                    Direction::Up
                };
                for query in runner::preview(migration, &schema, direction).await? {
                    println!("{};", query.sql);
                }
            }

            Commands::Generate { ref name, dry_run } => {
                let client = self.connect().await?;
                let live = introspect(&client, &self.pg_schema).await?;
                let description = name.as_deref().unwrap_or("auto");
                let Some(migration) =
                    DiffGenerator::new(&schema).generate(&live, description, Utc::now())?
                else {
                    info!("No changes detected.");
                    return Ok(());
                };

                let writer = MigrationWriter::new(&migration);
                if dry_run {
                    println!("Would create migration: {}", writer.file_name());
                    println!("\n{}", writer.render());
                } else {
                    writer.write_to(&self.migrations_dir)?;
                    gate::write_snapshot(&self.schema_dir, &schema)?;
                    info!(
                        module = %writer.module_name(),
                        "Add the new module's MIGRATION to the migration set"
                    );
                }
            }

            Commands::Init => {
                let runner = self.runner(schema, migrations).await?;
                info!("Initializing migrations system...");
                runner.init().await?;
                info!("Migrations table created successfully.");
            }

            Commands::Migrate { dry_run } => {
                let runner = self.runner(schema, migrations).await?;
                runner.init().await?;

                if dry_run {
                    info!("Dry run mode - SQL will be printed but not executed.");
                    for name in runner.pending().await? {
                        let migration = runner.migrations().require(&name)?;
                        println!("-- {name}");
                        for query in
                            runner::preview(migration, runner.schema(), Direction::Up).await?
                        {
                            println!("{};", query.sql);
                        }
                    }
                } else {
                    runner.migrate().await?;
                }
            }

            Commands::Apply { ref name } => {
                let runner = self.runner(schema, migrations).await?;
                runner.init().await?;
                if !runner.apply(name).await? {
                    info!(migration = %name, "Already applied");
                }
            }

            Commands::Status { json } => {
                let runner = self.runner(schema, migrations).await?;
                runner.init().await?;
                let report = runner.status().await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("\nMigrations:");
                    println!("{:-<60}", "");
                    for migration in &report.migrations {
                        let started = migration.started.map_or_else(String::new, |at| {
                            format!(" ({})", at.format("%Y-%m-%d %H:%M:%S"))
                        });
                        println!(" [{}] {}{}", migration.state, migration.name, started);
                    }
                    for entry in &report.unknown {
                        println!(" [unknown] {} ({})", entry.name, entry.state());
                    }
                    println!();
                }
            }

            Commands::Rollback { ref name, dry_run } => {
                if dry_run {
                    let migration = migrations.require(name)?;
                    for query in runner::preview(migration, &schema, Direction::Down).await? {
                        println!("{};", query.sql);
                    }
                    return Ok(());
                }
                let runner = self.runner(schema, migrations).await?;
                runner.init().await?;
                runner.rollback(name).await?;
            }

            Commands::Resolve {
                ref name,
                resolution,
            } => {
                let runner = self.runner(schema, migrations).await?;
                runner.init().await?;
                runner.resolve(name, resolution.into()).await?;
            }
        }

        Ok(())
    }

    async fn connect(&self) -> anyhow::Result<PgClient> {
        let url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL is not set; pass --database-url or set the variable")?;
        let threshold = (self.slow_query_ms > 0).then(|| Duration::from_millis(self.slow_query_ms));
        let client = PgClient::connect(url, self.max_connections)
            .await?
            .slow_query_threshold(threshold);
        Ok(client)
    }

    async fn runner(
        &self,
        schema: Schema,
        migrations: MigrationSet,
    ) -> anyhow::Result<MigrationRunner<PgClient, SqlHistoryStore<PgClient>>> {
        let client = self.connect().await?;
        Ok(MigrationRunner::new(
            client.clone(),
            SqlHistoryStore::new(client),
            Arc::new(schema),
            migrations,
        ))
    }
}
