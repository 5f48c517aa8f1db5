//! es-reindex CLI
//!
//! Copies an index between clusters, to a file, or both.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use es_reindex::config::{RetrySettings, EXAMPLE_CONFIG};
use es_reindex::{
    import_file, run_migration, DestinationConfig, MigrationConfig, MigrationOptions,
    MigrationReport, OutputConfig, RunResult, SourceConfig,
};

#[derive(Parser)]
#[command(name = "es-reindex")]
#[command(version)]
#[command(about = "Copy documents between search clusters using scroll and bulk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Source host (`host`, `host:port` or URL)
    #[arg(short = 'f', long, global = true, env = "ES_REINDEX_FROM")]
    from: Option<String>,

    /// Target host (`host`, `host:port` or URL)
    #[arg(short = 't', long, global = true, env = "ES_REINDEX_TO")]
    to: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export an index, re-indexing it into --to and/or writing it to a file
    Copy {
        /// Index to export
        index: String,

        /// Documents per scroll page (also the bulk size unless --batch-size)
        #[arg(short, long, default_value_t = 1000)]
        size: usize,

        /// Documents per bulk request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Milliseconds to wait between scroll requests
        #[arg(short, long, default_value_t = 100)]
        delay: u64,

        /// Write documents to this index instead of the original one
        #[arg(short, long)]
        rename: Option<String>,

        /// Also write the exported documents to this file (JSON lines)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Gzip the output file (implied by a .gz suffix)
        #[arg(long)]
        gzip: bool,

        /// Query DSL filter as JSON (default: match_all)
        #[arg(long)]
        query: Option<String>,

        /// Bulk response timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Retries for failed scroll and bulk requests (0 = fail fast)
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Import a JSON-lines export into --to
    Import {
        /// File written by `copy --output` (plain or .gz)
        file: PathBuf,

        /// Documents per bulk request
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,

        /// Write documents to this index instead of the recorded one
        #[arg(short, long)]
        rename: Option<String>,

        /// Bulk response timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Retries for failed bulk requests (0 = fail fast)
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Run migration from config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the summary and failure list.
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Copy {
            index,
            size,
            batch_size,
            delay,
            rename,
            output,
            gzip,
            query,
            timeout,
            retries,
        } => {
            let Some(from) = cli.from else {
                bail!("copy needs a source host: pass --from <host>");
            };

            let mut source = SourceConfig::new(from, index);
            source.page_size = size;
            source.delay_ms = delay;
            source.query = query
                .map(|q| serde_json::from_str(&q))
                .transpose()
                .context("--query is not valid JSON")?;

            let destination = cli.to.map(|to| {
                let mut dest = DestinationConfig::new(to);
                dest.batch_size = batch_size.unwrap_or(size);
                dest.timeout_secs = timeout;
                dest.rename = rename.clone();
                dest
            });
            if destination.is_none() && rename.is_some() {
                bail!("--rename only applies when re-indexing: pass --to <host>");
            }

            let config = MigrationConfig {
                source,
                destination,
                output: output.map(|path| OutputConfig { path, gzip }),
                options: options(cli.quiet, retries),
            };
            run_config(&config).await?;
        }
        Commands::Import {
            file,
            batch_size,
            rename,
            timeout,
            retries,
        } => {
            let Some(to) = cli.to else {
                bail!("import needs a target host: pass --to <host>");
            };

            let mut destination = DestinationConfig::new(to);
            destination.batch_size = batch_size;
            destination.timeout_secs = timeout;
            destination.rename = rename;

            let options = options(cli.quiet, retries);
            info!("Importing {} into {}", file.display(), destination.url);
            let result = import_file(&file, false, &destination, &options).await;
            finish(result)?;
        }
        Commands::Run { config } => {
            info!("Loading configuration from {:?}", config);
            let mut config = MigrationConfig::from_file(&config)?;
            if let Some(from) = cli.from {
                config.source.url = from;
            }
            if let (Some(to), Some(dest)) = (cli.to, config.destination.as_mut()) {
                dest.url = to;
            }
            config.options.quiet |= cli.quiet;
            run_config(&config).await?;
        }
        Commands::Validate { config } => {
            validate_config(&config)?;
        }
        Commands::Init { output } => {
            generate_config(&output)?;
        }
    }

    Ok(())
}

fn options(quiet: bool, retries: u32) -> MigrationOptions {
    MigrationOptions {
        quiet,
        retry: RetrySettings {
            max_retries: retries,
            ..Default::default()
        },
    }
}

async fn run_config(config: &MigrationConfig) -> anyhow::Result<()> {
    config.validate()?;

    eprintln!(
        "Exporting {} from {}",
        style(&config.source.index).bold(),
        config.source.url
    );
    let result = run_migration(config).await;
    finish(result)
}

/// Prints the summary and the failure list; a fatal error becomes the exit
/// status.
fn finish(result: RunResult) -> anyhow::Result<()> {
    match result {
        Ok(report) => {
            println!("\n{}", style("✅ Migration Complete!").green().bold());
            print_report(&report)?;
            Ok(())
        }
        Err(failure) => {
            println!("\n{}", style("❌ Migration Aborted").red().bold());
            print_report(&failure.report)?;
            Err(failure.error.into())
        }
    }
}

fn print_report(report: &MigrationReport) -> anyhow::Result<()> {
    println!("   Exported:   {}", report.exported);
    if report.flushes > 0 {
        println!("   Indexed:    {}", report.indexed);
        println!("   Failed:     {}", report.failed());
    }
    if report.written_to_file > 0 {
        println!("   Written:    {}", report.written_to_file);
    }
    println!("   Duration:   {:.2}s", report.duration_secs);
    println!("   Throughput: {:.0} docs/sec", report.throughput());

    if !report.failures.is_empty() {
        println!("\nThe following docs failed to import");
        println!("{}", serde_json::to_string_pretty(&report.failures)?);
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;

    println!("{}", style("✅ Configuration is valid!").green());
    println!("   Source:      {} / {}", config.source.url, config.source.index);
    match &config.destination {
        Some(dest) => println!(
            "   Destination: {} (batch size {})",
            dest.url, dest.batch_size
        ),
        None => println!("   Destination: none (export only)"),
    }
    if let Some(output) = &config.output {
        println!(
            "   Output:      {}{}",
            output.path.display(),
            if output.is_gzip() { " (gzip)" } else { "" }
        );
    }

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, EXAMPLE_CONFIG)
        .with_context(|| format!("cannot write {}", output.display()))?;
    println!("✅ Generated configuration: {:?}", output);
    println!(
        "   Edit the file and run: es-reindex run --config {:?}",
        output
    );

    Ok(())
}
