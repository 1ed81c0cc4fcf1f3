//! sqtop - Live terminal dashboard for Slurm clusters

mod attach;
mod config;
mod display;
mod formatting;
mod models;
mod parser;
mod refresh;
mod slurm;
mod store;
mod tui;
mod view;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::{LoadedConfig, SqtopConfig};
use models::{EntityKind, Job, Node, Partition};
use refresh::Poller;
use slurm::SlurmInterface;
use slurm::logs::{LOG_TAIL_LINES, LogStream};
use slurm::runner::CommandRunner;
use store::{Snapshot, SnapshotStore, Stored};
use view::{Filterable, SortDirection, SortSpec, Sortable, ViewQuery};

#[derive(Parser)]
#[command(name = "sqtop")]
#[command(about = "Live terminal dashboard for Slurm clusters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive dashboard (default)
    #[command(alias = "ui")]
    Tui,

    /// Print the job queue once
    Jobs {
        #[command(flatten)]
        query: QueryArgs,

        /// Only show jobs of the current user
        #[arg(short, long)]
        mine: bool,
    },

    /// Print node state once
    Nodes {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print partitions once
    #[command(alias = "part")]
    Partitions {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Print the tail of a job's output file
    Log {
        job_id: String,

        /// Read the stderr file instead of stdout
        #[arg(long)]
        stderr: bool,

        /// Number of lines
        #[arg(short = 'n', long, default_value_t = LOG_TAIL_LINES)]
        lines: usize,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Filter expression, e.g. "user:alice state:r !part:debug"
    #[arg(short, long, value_name = "TEXT")]
    filter: Option<String>,

    /// Sort column
    #[arg(short, long, value_name = "FIELD")]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl QueryArgs {
    fn view_query<F>(&self) -> Result<ViewQuery<F>>
    where
        F: FromStr<Err = String> + Default + Copy + Eq,
    {
        let field = match &self.sort {
            Some(name) => F::from_str(name).map_err(|e| anyhow!(e))?,
            None => F::default(),
        };
        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        Ok(ViewQuery::new(SortSpec::new(field, direction)).with_filter(self.filter.as_deref().unwrap_or_default()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let loaded = SqtopConfig::load()?;
    for warning in &loaded.warnings {
        tracing::warn!("config: {}", warning);
    }

    match cli.command {
        None | Some(Commands::Tui) => tui::run(loaded),
        Some(Commands::Jobs { query, mine }) => {
            let only_user = mine.then(SlurmInterface::current_user);
            let view_query = query.view_query()?.with_only_user(only_user);
            let out = run_oneshot::<Job>(&loaded, &view_query, query.json, display::format_jobs)?;
            println!("{}", out);
            Ok(())
        }
        Some(Commands::Nodes { query }) => {
            let view_query = query.view_query()?;
            let out = run_oneshot::<Node>(&loaded, &view_query, query.json, display::format_nodes)?;
            println!("{}", out);
            Ok(())
        }
        Some(Commands::Partitions { query }) => {
            let view_query = query.view_query()?;
            let out = run_oneshot::<Partition>(&loaded, &view_query, query.json, display::format_partitions)?;
            println!("{}", out);
            Ok(())
        }
        Some(Commands::Log { job_id, stderr, lines }) => {
            let stream = if stderr { LogStream::Stderr } else { LogStream::Stdout };
            let tail = tokio::runtime::Runtime::new()?
                .block_on(slurm_interface(&loaded).fetch_log(&job_id, stream, lines))
                .with_context(|| format!("failed to read {} of job {}", stream, job_id))?;
            eprintln!("==> {} <==", tail.path);
            print!("{}", tail.text);
            Ok(())
        }
    }
}

fn slurm_interface(loaded: &LoadedConfig) -> SlurmInterface {
    let config = &loaded.config;
    let runner = CommandRunner::new(config.refresh.command_timeout());
    let slurm = SlurmInterface::with_config(config.system.slurm_bin_path.as_deref(), runner, loaded.layouts.clone());
    if slurm.is_unverified_fallback() {
        eprintln!("Warning: sinfo not found in PATH or standard locations; set SQTOP_SLURM_PATH");
    }
    slurm
}

/// Fetch one entity kind through the normal refresh path and render it.
fn run_oneshot<T>(
    loaded: &LoadedConfig,
    query: &ViewQuery<T::Field>,
    json: bool,
    table: fn(&[&T], &config::ColumnCaps) -> String,
) -> Result<String>
where
    T: Stored + Sortable + Filterable + serde::Serialize,
{
    let config = &loaded.config;
    let slurm = slurm_interface(loaded);

    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt.block_on(fetch_once::<T>(slurm, loaded.layouts.clone(), config.refresh.stale_after()))?;

    let rows = query.apply(snapshot.records());
    if json {
        display::format_json(&rows)
    } else {
        Ok(table(&rows, &config.columns))
    }
}

async fn fetch_once<T: Stored>(
    slurm: SlurmInterface,
    layouts: config::QueryLayouts,
    stale_after: Duration,
) -> Result<Arc<Snapshot<T>>> {
    let store = Arc::new(SnapshotStore::new(stale_after));
    let poller = Poller::new(Arc::new(slurm), Arc::clone(&store), layouts);

    let kind: EntityKind = T::KIND;
    let (_, fetch) = poller.fetch(kind);
    fetch
        .await
        .result
        .with_context(|| format!("failed to query {}", kind))?;

    Ok(store.current::<T>().snapshot)
}

/// Install a file logger when `SQTOP_LOG` is set.
///
/// The dashboard owns the terminal, so logs never go to stdout or stderr.
/// `SQTOP_LOG` is an env-filter directive (`debug`, `sqtop=trace`, ...).
fn init_logging() {
    let Ok(directive) = std::env::var("SQTOP_LOG") else {
        return;
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = std::env::var_os("SQTOP_LOG_FILE")
        .map(PathBuf::from)
        .or_else(|| dirs::cache_dir().map(|d| d.join("sqtop").join("sqtop.log")))
    else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => eprintln!("Warning: cannot open log file {}: {}", path.display(), e),
    }
}
