//! jobmill - Main entry point

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jobmill_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

use jobmill_dispatch::config::Config;
use jobmill_dispatch::db;
use jobmill_dispatch::dispatch::shard::write_job_files;
use jobmill_dispatch::dispatch::{
    AnalysisCatalog, DedupStrategy, DirectoryInputs, DispatchOptions, DispatchPipeline,
    JsonFileCatalog, StaticCatalog,
};
use jobmill_dispatch::store::{JobStore, MemoryJobStore, PgJobStore};

#[derive(Parser, Debug)]
#[command(name = "jobmill")]
#[command(author, version, about = "Admit analysis jobs and fan them out to workers", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate, admit and assign jobs to worker directories
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        /// Root under which worker_<i> directories are written
        #[arg(short, long, env = "JOBMILL_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Number of downstream workers
        #[arg(short, long, env = "JOBMILL_WORKERS")]
        workers: Option<usize>,

        /// Re-dispatch jobs whose last attempt failed
        #[arg(long)]
        retry_failed: bool,

        /// Re-dispatch jobs stuck in running
        #[arg(long)]
        retry_running: bool,

        /// How to check candidates against the store
        #[arg(long, value_enum)]
        dedup: Option<DedupStrategy>,

        /// Report what would happen without writing to the store or disk
        #[arg(long)]
        dry_run: bool,
    },

    /// Write candidate job files without touching the store
    Generate {
        #[command(flatten)]
        sources: SourceArgs,

        /// Directory to write <job_hash>.json files into
        #[arg(short, long, default_value = "./candidates")]
        output_dir: PathBuf,
    },

    /// Apply database migrations
    Migrate,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Directory holding the input datasets
    #[arg(short, long, env = "JOBMILL_INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// JSON array of analysis specs; the built-in catalog when omitted
    #[arg(short, long, env = "JOBMILL_CATALOG")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("jobmill")
        .filter_directives("sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring invalid LOG_* settings: {e}");
        LogConfig::default()
    });

    // Keep the guard alive so file output is flushed on exit
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        },
    };

    if let Err(e) = execute_command(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn execute_command(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            sources,
            output_dir,
            workers,
            retry_failed,
            retry_running,
            dedup,
            dry_run,
        } => {
            sources.apply(&mut config);
            if let Some(output_dir) = output_dir {
                config.dispatch.output_dir = output_dir;
            }
            if let Some(workers) = workers {
                config.dispatch.workers = workers;
            }
            if let Some(dedup) = dedup {
                config.dispatch.dedup_strategy = dedup;
            }
            config.dispatch.retry_failed |= retry_failed;
            config.dispatch.retry_running |= retry_running;
            config.validate()?;

            run(&config, dry_run).await
        },
        Commands::Generate {
            sources,
            output_dir,
        } => {
            sources.apply(&mut config);
            generate(&config, output_dir).await
        },
        Commands::Migrate => {
            let pool = db::create_pool(&config.database)
                .await
                .context("Failed to connect to database")?;
            db::run_migrations(&pool).await?;
            println!("Migrations applied");
            Ok(())
        },
    }
}

impl SourceArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(input_dir) = &self.input_dir {
            config.dispatch.input_dir = input_dir.clone();
        }
        if let Some(catalog) = &self.catalog {
            config.dispatch.catalog_path = Some(catalog.clone());
        }
    }
}

fn catalog_for(config: &Config) -> Arc<dyn AnalysisCatalog> {
    match &config.dispatch.catalog_path {
        Some(path) => Arc::new(JsonFileCatalog::new(path)),
        None => Arc::new(StaticCatalog::builtin()),
    }
}

fn inputs_for(config: &Config) -> Arc<DirectoryInputs> {
    Arc::new(DirectoryInputs::new(
        &config.dispatch.input_dir,
        &config.dispatch.input_extension,
    ))
}

async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let mut store_unreachable = false;
    let store: Arc<dyn JobStore> = if dry_run {
        // A dry run still reads the store when one is reachable
        match db::create_pool(&config.database).await {
            Ok(pool) => Arc::new(PgJobStore::new(pool)),
            Err(e) => {
                warn!(
                    error = %e,
                    "Database unavailable, dry run against an empty store; every candidate will count as new"
                );
                store_unreachable = true;
                Arc::new(MemoryJobStore::new())
            },
        }
    } else {
        let pool = db::create_pool(&config.database)
            .await
            .context("Failed to connect to database")?;
        db::run_migrations(&pool).await?;
        Arc::new(PgJobStore::new(pool))
    };

    let options = DispatchOptions::from(config)
        .dry_run(dry_run)
        .with_store_unreachable(store_unreachable);

    info!(
        input_dir = %config.dispatch.input_dir.display(),
        output_dir = %config.dispatch.output_dir.display(),
        workers = config.dispatch.workers,
        dedup = %config.dispatch.dedup_strategy,
        "Starting dispatch pass"
    );

    let pipeline = DispatchPipeline::new(store, inputs_for(config), catalog_for(config), options);
    let report = pipeline.run().await?;

    println!("{}", report.summary);
    Ok(())
}

async fn generate(config: &Config, output_dir: PathBuf) -> Result<()> {
    let pipeline = DispatchPipeline::new(
        Arc::new(MemoryJobStore::new()),
        inputs_for(config),
        catalog_for(config),
        DispatchOptions::from(config),
    );

    let (summary, generated) = pipeline.generate().await?;
    write_job_files(&output_dir, &generated.candidates)
        .await
        .with_context(|| format!("Failed to write candidates to {}", output_dir.display()))?;

    println!(
        "Wrote {} candidate job(s) to {} ({} rejected, {} duplicate)",
        summary.generated,
        output_dir.display(),
        summary.rejected,
        summary.duplicates
    );
    Ok(())
}
