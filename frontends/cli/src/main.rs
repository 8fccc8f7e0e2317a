use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use clickdown::config::DEFAULT_SLICE_BUDGET_SECS;
use clickdown::retry::call_with_retry;
use clickdown::{
    CheckpointStore, ClickUpApi, ClickUpClient, ExtractConfig, ExtractionEngine, ExtractionRoot,
    FileCheckpointStore, HierarchyEnumerator, JsonlSink, LogBuffer, RecordingScheduler,
    RunOutcome,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Lines of buffered log printed when a run fails
const FAILURE_LOG_TAIL: usize = 20;

/// Extract ClickUp tasks into rows, continuously or in resumable slices
#[derive(Parser)]
#[command(name = "clickdown")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// YAML configuration file
    #[arg(long, global = true, env = "CLICKDOWN_CONFIG")]
    config: Option<PathBuf>,

    /// Extract a whole workspace (team id)
    #[arg(long, global = true, conflicts_with = "list")]
    team: Option<String>,

    /// Extract a single list
    #[arg(long, global = true)]
    list: Option<String>,

    /// Output file; rows as JSON arrays, one per line
    #[arg(long, global = true, default_value = "clickdown.jsonl")]
    out: PathBuf,

    /// Checkpoint file
    #[arg(long, global = true, default_value = "clickdown.checkpoint.json")]
    state: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the teams the API key can access
    Teams,

    /// Print the ordered list of lists the configured root would extract
    Plan,

    /// Run one extraction invocation
    Run {
        /// Stop after a time budget and save a checkpoint
        #[arg(long)]
        time_sliced: bool,

        /// Time budget in seconds; implies --time-sliced
        #[arg(long)]
        budget_secs: Option<u64>,

        /// After a suspension, wait the resume delay and continue
        #[arg(long)]
        follow: bool,
    },

    /// Delete the stored checkpoint
    Clear,
}

fn init_logging(log_file: Option<&Path>, buffer: &LogBuffer) -> Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, stderr_layer) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            (Some(fmt::layer().with_writer(file).with_ansi(false)), None)
        }
        None => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .with(fmt::layer().with_writer(buffer.clone()).with_ansi(false))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// File, then environment, then flags
fn load_config(args: &CommonArgs) -> Result<ExtractConfig> {
    let config = match &args.config {
        Some(path) => ExtractConfig::load_from_file(path)?,
        None => ExtractConfig::default(),
    };
    let mut config = config.apply_env();

    if let Some(team_id) = &args.team {
        config.root = Some(ExtractionRoot::Workspace {
            team_id: team_id.clone(),
        });
    }
    if let Some(list_id) = &args.list {
        config.root = Some(ExtractionRoot::SingleList {
            list_id: list_id.clone(),
        });
    }
    Ok(config)
}

fn build_client(config: &ExtractConfig) -> Result<Arc<dyn ClickUpApi>> {
    if config.api_key.trim().is_empty() {
        bail!("no API key: set CLICKUP_API_KEY or api_key in the config file");
    }
    let client = ClickUpClient::new(&config.api_key, &config.base_url, config.request_timeout())?;
    Ok(Arc::new(client))
}

async fn teams(config: &ExtractConfig) -> Result<()> {
    let api = build_client(config)?;
    let teams = call_with_retry(&config.retry, "teams", || api.teams()).await?;
    for team in teams {
        println!("{}\t{}", team.id, team.name);
    }
    Ok(())
}

async fn plan(config: &ExtractConfig) -> Result<()> {
    config.validate()?;
    let api = build_client(config)?;
    let enumerator = HierarchyEnumerator::new(api, config);
    let plan = enumerator.leaves(config.root()?).await?;

    for leaf in &plan.leaves {
        println!(
            "{}.{}.{}\t{} / {} / {}\t{}",
            leaf.position.space,
            leaf.position.folder,
            leaf.position.list,
            leaf.provenance.space,
            leaf.provenance.folder,
            leaf.provenance.list,
            leaf.list.id
        );
    }
    println!(
        "{} lists, {} branches skipped",
        plan.leaves.len(),
        plan.skipped_branches
    );
    Ok(())
}

async fn run(
    mut config: ExtractConfig,
    args: &CommonArgs,
    time_sliced: bool,
    budget_secs: Option<u64>,
    follow: bool,
    log: &LogBuffer,
) -> Result<()> {
    if time_sliced || budget_secs.is_some() {
        config.time_budget_secs = Some(budget_secs.unwrap_or(DEFAULT_SLICE_BUDGET_SECS));
    }

    let api = build_client(&config)?;
    let scheduler = RecordingScheduler::new();
    let mut engine = ExtractionEngine::new(
        api,
        config,
        Arc::new(JsonlSink::new(&args.out)),
        Arc::new(FileCheckpointStore::new(&args.state)),
        Arc::new(scheduler.clone()),
    )?;

    loop {
        match engine.run().await {
            Ok(RunOutcome::Completed(summary)) => {
                let tally = &summary.tally;
                println!("Extraction completed (run {})", summary.run_id);
                println!("  rows written:      {}", tally.rows_written);
                println!("  pages fetched:     {}", tally.pages_fetched);
                println!("  lists completed:   {}", tally.lists_completed);
                println!("  lists skipped:     {}", tally.lists_skipped);
                println!("  branches skipped:  {}", tally.branches_skipped);
                println!("  invocations:       {}", tally.invocations);
                println!("  columns:           {}", summary.columns);
                println!("  output:            {}", args.out.display());
                return Ok(());
            }
            Ok(RunOutcome::Suspended {
                checkpoint,
                resume_after,
            }) => {
                let p = checkpoint.position;
                println!(
                    "Suspended at space {} folder {} list {} archived {} page {} ({} rows so far)",
                    p.space, p.folder, p.list, p.archived, p.page, checkpoint.tally.rows_written
                );
                if !follow {
                    println!(
                        "Run again after {:?} to continue; the checkpoint is in {}",
                        resume_after,
                        args.state.display()
                    );
                    return Ok(());
                }
                let delay = scheduler.take().unwrap_or(resume_after);
                info!("Resuming in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                eprintln!("Extraction failed: {}", e);
                eprintln!("Last log lines:");
                for line in log.tail(FAILURE_LOG_TAIL) {
                    eprintln!("  {}", line);
                }
                return Err(e.into());
            }
        }
    }
}

async fn clear(args: &CommonArgs) -> Result<()> {
    FileCheckpointStore::new(&args.state).clear().await?;
    println!("Checkpoint {} cleared", args.state.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = LogBuffer::default();
    init_logging(cli.common.log_file.as_deref(), &log)?;

    let config = load_config(&cli.common)?;
    match cli.command {
        Commands::Teams => teams(&config).await,
        Commands::Plan => plan(&config).await,
        Commands::Run {
            time_sliced,
            budget_secs,
            follow,
        } => run(config, &cli.common, time_sliced, budget_secs, follow, &log).await,
        Commands::Clear => clear(&cli.common).await,
    }
}
