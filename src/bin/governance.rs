//! Schema Governance CLI
//!
//! Scans a repository of versioned JSON Schemas and prints the governance
//! report.
//!
//! Exit codes:
//! - 0: no error-severity issues
//! - 1: at least one error-severity issue
//! - 2: the scan could not run (bad root, bad configuration)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use schema_governance::{
    CompatibilityClassifier, GovernanceConfig, GovernanceEngine, GovernanceReport, ReferenceResolver,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-governance")]
#[command(about = "Resolve references, classify changes and check lifecycle metadata of versioned JSON Schemas")]
struct Cli {
    /// Repository root
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Explicit configuration file, layered over governance.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every schema family (default)
    Scan,

    /// Scan families touched by the given paths and their dependents
    Changed {
        /// Changed files, relative to the root or absolute
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Classify the change between two documents of the repository
    Classify {
        /// Repository path of the older document
        old: String,
        /// Repository path of the newer document
        new: String,
    },

    /// Write the effective configuration as TOML
    Config {
        /// Output file
        #[arg(short, long, default_value = "governance.toml")]
        output: PathBuf,
    },
}

fn main() {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(has_errors) => std::process::exit(if has_errors { 1 } else { 0 }),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = GovernanceConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    let engine = GovernanceEngine::new(config);

    match cli.command.unwrap_or(Commands::Scan) {
        Commands::Scan => {
            let report = engine
                .scan(&cli.root)
                .with_context(|| format!("failed to scan {}", cli.root.display()))?;
            print_report(&report, cli.format)?;
            Ok(report.has_errors())
        }

        Commands::Changed { paths } => {
            let report = engine
                .scan_changed(&cli.root, &paths)
                .with_context(|| format!("failed to scan {}", cli.root.display()))?;
            print_report(&report, cli.format)?;
            Ok(report.has_errors())
        }

        Commands::Classify { old, new } => classify(&engine, &cli.root, &old, &new, cli.format),

        Commands::Config { output } => {
            engine
                .config()
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            eprintln!("Wrote {}", output.display());
            Ok(false)
        }
    }
}

fn classify(engine: &GovernanceEngine, root: &Path, old: &str, new: &str, format: Format) -> anyhow::Result<bool> {
    let store = schema_governance::DocumentStore::new(engine.config().scan.clone());
    let outcome = store.load(root)?;
    let corpus = &outcome.corpus;

    let (Some(old_doc), Some(new_doc)) = (corpus.get_by_path(old), corpus.get_by_path(new)) else {
        bail!("both '{}' and '{}' must be schema documents under {}", old, new, root.display());
    };

    let resolver = ReferenceResolver::new(corpus, &engine.config().resolution);
    let old_schema = resolver.resolve(old_doc).with_context(|| format!("cannot resolve {}", old))?;
    let new_schema = resolver.resolve(new_doc).with_context(|| format!("cannot resolve {}", new))?;
    let verdict = CompatibilityClassifier::new().classify(&old_schema, &new_schema);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
        Format::Text => {
            println!("{}", verdict.summary());
            for diff in &verdict.diffs {
                println!("  [{}] {}", diff.class, diff.message());
            }
        }
    }
    Ok(false)
}

fn print_report(report: &GovernanceReport, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", report.to_json()?),
        Format::Text => print!("{}", report),
    }
    Ok(())
}
