mod config;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{load_config, LakeConfig, ScopeConfig, DEFAULT_CONFIG_PATH};
use lake_core::{canonical_json, Layer, NewRawRow, Partition};
use lake_engine::{run_scopes, CancelToken, Plugin, ScopeJob, ScopeRun, SubtaskOutcome};
use lake_storage::LakeStore;
use lake_tapd_adapter::Tapd;
use lake_zentao_adapter::Zentao;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

static PLUGINS: &[&dyn Plugin] = &[&Tapd, &Zentao];

#[derive(Parser, Debug)]
#[command(name = "lake")]
#[command(about = "Raw-to-domain transformation pipeline", long_about = None)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Overrides `database` from the config file.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Overrides `workers` from the config file.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append raw payloads, one JSON document per line, to a raw table
    Import {
        #[arg(long)]
        table: String,
        /// Scope params as a JSON object, e.g. '{"ConnectionId":1,"WorkspaceId":99}'
        #[arg(long)]
        params: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Run a plugin for one scope, or every scope in the config file
    Run {
        #[arg(long, requires_all = ["connection", "primary"])]
        plugin: Option<String>,
        #[arg(long, requires = "plugin")]
        connection: Option<u64>,
        #[arg(long, requires = "plugin")]
        primary: Option<u64>,
        /// Ignored, with a warning, by plugins without a secondary dimension
        #[arg(long, requires = "plugin")]
        secondary: Option<u64>,
    },
    /// Print entity rows as JSON lines
    Dump {
        #[arg(long)]
        layer: Layer,
        #[arg(long)]
        table: String,
        #[arg(long)]
        params: Option<String>,
    },
    /// List registered plugins and their subtasks
    Plugins,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(cli.debug, &config);

    match cli.command {
        Commands::Plugins => {
            for plugin in PLUGINS {
                println!("{}: {}", plugin.name(), plugin.description());
                for meta in plugin.subtasks() {
                    let marker = if meta.enabled_by_default { "*" } else { " " };
                    println!("  {marker} {:<24} {}", meta.name, meta.description);
                }
            }
        }
        Commands::Import {
            table,
            params,
            file,
        } => {
            let store = open_store(cli.db.as_ref(), &config)?;
            let partition = Partition::new(table, canonical_params(&params)?);
            let rows = read_payloads(&file)?;
            let ids = store
                .insert_raw_rows(&partition, &rows)
                .context("failed to import raw rows")?;
            info!(
                event = "raw_imported",
                table = partition.table(),
                params = partition.params(),
                rows = ids.len()
            );
            println!("imported {} rows into {}", ids.len(), partition.table());
        }
        Commands::Run {
            plugin,
            connection,
            primary,
            secondary,
        } => {
            let store = open_store(cli.db.as_ref(), &config)?;
            let scopes = match (plugin, connection, primary) {
                (Some(plugin), Some(connection_id), Some(primary)) => vec![ScopeConfig {
                    plugin,
                    connection_id,
                    primary,
                    secondary,
                }],
                _ => config.scopes.clone(),
            };
            if scopes.is_empty() {
                bail!(
                    "no scopes to run: pass --plugin/--connection/--primary \
                     or add [[scopes]] to the config"
                );
            }
            let jobs = build_jobs(&scopes)?;
            let workers = cli.workers.unwrap_or(config.workers);
            let runs = run_scopes(&store, &jobs, workers, &CancelToken::new())?;

            let mut failed = 0;
            for run in &runs {
                if !run.is_ok() {
                    failed += 1;
                }
                println!("{}", summarize(run));
            }
            if failed > 0 {
                bail!("{failed} of {} scopes failed", runs.len());
            }
        }
        Commands::Dump {
            layer,
            table,
            params,
        } => {
            let store = open_store(cli.db.as_ref(), &config)?;
            let records = match params {
                Some(params) => store.entities(layer, &canonical_params(&params)?, &table)?,
                None => store.table_entities(layer, &table)?,
            };
            for record in records {
                println!("{}", serde_json::to_string(&record.columns()?)?);
            }
        }
    }

    Ok(())
}

fn init_logging(debug: bool, config: &LakeConfig) {
    let level = resolve_log_level(
        debug,
        std::env::var("LAKE_LOG_LEVEL").ok(),
        config.log_level.as_deref(),
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialized");
    }
}

fn resolve_log_level(debug: bool, env_level: Option<String>, config_level: Option<&str>) -> String {
    if debug {
        return "debug".to_string();
    }
    env_level
        .filter(|level| !level.trim().is_empty())
        .or_else(|| config_level.map(str::to_string))
        .unwrap_or_else(|| "info".to_string())
}

fn open_store(db: Option<&PathBuf>, config: &LakeConfig) -> Result<LakeStore> {
    let path = db.unwrap_or(&config.database);
    LakeStore::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn find_plugin(name: &str) -> Result<&'static dyn Plugin> {
    PLUGINS
        .iter()
        .copied()
        .find(|plugin| plugin.name() == name)
        .ok_or_else(|| anyhow!("unknown plugin: {name}"))
}

fn build_jobs(scopes: &[ScopeConfig]) -> Result<Vec<ScopeJob<'static>>> {
    scopes
        .iter()
        .map(|scope| {
            let plugin = find_plugin(&scope.plugin)?;
            let key = plugin.scope_key(scope.connection_id, scope.primary, scope.secondary);
            if let (Some(secondary), None) = (scope.secondary, key.secondary()) {
                warn!(
                    event = "secondary_ignored",
                    plugin = plugin.name(),
                    secondary,
                    params = %key.params()
                );
            }
            Ok(ScopeJob { plugin, scope: key })
        })
        .collect()
}

/// Normalizes user-supplied params so they match the stored form exactly.
fn canonical_params(raw: &str) -> Result<String> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("params are not JSON: {raw}"))?;
    if !value.is_object() {
        bail!("params must be a JSON object: {raw}");
    }
    Ok(canonical_json(&value)?)
}

fn read_payloads(path: &Path) -> Result<Vec<NewRawRow>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        serde_json::from_str::<Value>(line)
            .with_context(|| format!("{}:{}: invalid JSON payload", path.display(), index + 1))?;
        rows.push(NewRawRow::new(line));
    }
    Ok(rows)
}

fn summarize(run: &ScopeRun) -> String {
    match &run.result {
        Ok(reports) => {
            let steps = reports
                .iter()
                .map(|report| match report.outcome {
                    SubtaskOutcome::Completed => format!(
                        "{} {}->{}",
                        report.subtask, report.rows_read, report.entities_written
                    ),
                    SubtaskOutcome::Skipped => format!("{} skipped", report.subtask),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("ok     {} {} [{steps}]", run.plugin, run.params)
        }
        Err(err) => format!("failed {} {}: {err}", run.plugin, run.params),
    }
}
