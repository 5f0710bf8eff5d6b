//! strata CLI
//!
//! Command-line tool for migrating content collections and inspecting their
//! runtime schemas.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use strata_migrate::prelude::*;

/// Schema migrations for content collections.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file.
    #[arg(short, long, default_value = "strata.toml")]
    config: PathBuf,

    /// Database URL (overrides the settings file).
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan, apply and snapshot pending schema changes.
    Migrate {
        /// Only migrate this collection.
        #[arg(short, long)]
        collection: Option<String>,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the migration plan and inactive collections.
    Plan,

    /// Print the runtime schema of a collection as JSON.
    Schema {
        /// Collection key.
        key: String,
    },

    /// Show the snapshot history of a collection.
    Snapshots {
        /// Collection key.
        key: String,
    },

    /// Resolve every collection into the schema cache.
    Warm,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
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

    let settings = Settings::load(&cli.config)?.with_database_url(cli.database);
    let engine = Engine::connect(&settings).await?;

    match cli.command {
        Commands::Migrate {
            collection,
            dry_run,
        } => {
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            let outcome = engine.migrator(dry_run).migrate(collection.as_deref()).await?;

            for collection in &outcome.collections {
                let report = &collection.report;
                if dry_run {
                    for sql in &report.statements {
                        println!("{sql};\n");
                    }
                }
                for skipped in &report.skipped {
                    warn!(
                        "{}.{}: {} changed; apply manually",
                        skipped.table,
                        skipped.change.column,
                        skipped.change.attributes().join(", ")
                    );
                }
            }
            print_inactive(&outcome.inactive);

            info!(
                "Migrated {} collection(s), {} statement(s){}",
                outcome.collections.len(),
                outcome.statement_count(),
                if dry_run { " (dry run)" } else { "" }
            );
        }

        Commands::Plan => {
            let dry_run = engine.resolver.dry_run().await?;
            let preview = engine.preview().await?;

            if !dry_run.has_changes() {
                info!("No changes detected.");
            }
            for (key, statements) in &preview {
                let Some(plan) = dry_run.collection(key) else {
                    continue;
                };
                if plan.diff.plan.is_empty() {
                    continue;
                }
                println!("\n{key}:");
                println!("{:-<60}", "");
                for op in &plan.diff.plan.tables {
                    println!("  {}", op.describe());
                }
                for sql in statements {
                    println!("\n{sql};");
                }
            }
            for failure in &dry_run.failures {
                println!("\n{}: invalid configuration: {}", failure.key, failure.error);
            }
            print_inactive(&dry_run.inactive);
        }

        Commands::Schema { key } => {
            let schema = engine.resolver.runtime_schema(&key).await?;
            println!("{}", serde_json::to_string_pretty(&*schema)?);
        }

        Commands::Snapshots { key } => {
            let history = engine.resolver.snapshots().history(&key).await?;

            if history.is_empty() {
                info!("No snapshots recorded for '{key}'.");
            } else {
                println!("\nSnapshots for {key}:");
                println!("{:-<60}", "");
                for snapshot in &history {
                    println!(
                        " #{} {} ({} tables, {} columns)",
                        snapshot.id,
                        snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                        snapshot.schema.tables.len(),
                        snapshot.schema.column_count()
                    );
                }
                println!();
            }
        }

        Commands::Warm => {
            let report = engine.resolver.warm().await?;
            for (key, error) in &report.failed {
                println!(" [ ] {key}: {error}");
            }
            for key in &report.warmed {
                println!(" [X] {key}");
            }
        }
    }

    Ok(())
}

fn print_inactive(inactive: &[InactiveCollection]) {
    if inactive.is_empty() {
        return;
    }
    println!("\nInactive collections (tables left in place):");
    for collection in inactive {
        println!("  {} ({})", collection.key, collection.tables.join(", "));
    }
}
