//! Attribute manager worker
//!
//! Reads update jobs as NDJSON (`{"app_name": ..., "user_id": ...}` per line)
//! from a file or stdin and runs them through the dispatcher.

use am_core::{telemetry, AmConfig, AttributeManager, DispatchStats, JobDispatcher, UpdateJob};
use am_plugins::{PluginRegistry, PluginSpec};
use am_store::{
    Backend, Client, Document, MemoryBackend, Namespace, ATTRIBUTES_COLLECTION, MEMORY_SCHEME,
};
use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML configuration");

    Command::new("am-worker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Attribute manager worker")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run update jobs")
                .arg(config_arg.clone())
                .arg(
                    Arg::new("jobs")
                        .long("jobs")
                        .value_parser(value_parser!(PathBuf))
                        .help("NDJSON job file; stdin when absent"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON file {db: {collection: [docs]}} loaded into the memory store"),
                )
                .arg(
                    Arg::new("dump")
                        .long("dump")
                        .action(ArgAction::SetTrue)
                        .help("Print canonical records as NDJSON after the run"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate configuration and plugin declarations")
                .arg(config_arg),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("check-config", args)) => check_config(args),
        _ => Ok(()),
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<AmConfig> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    AmConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn is_memory_uri(uri: &str) -> bool {
    uri.split_once("://")
        .is_some_and(|(scheme, _)| scheme == MEMORY_SCHEME)
}

async fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    telemetry::init(&config.log)?;

    let memory = is_memory_uri(&config.store.uri).then(MemoryBackend::new);
    let client = match &memory {
        Some(backend) => {
            if let Some(seed) = args.get_one::<PathBuf>("seed") {
                let count = seed_backend(backend, seed).await?;
                tracing::info!(documents = count, seed = %seed.display(), "seeded memory store");
            }
            Client::with_backend(Arc::new(backend.clone()))
        }
        None => {
            if args.contains_id("seed") {
                bail!("--seed requires a {MEMORY_SCHEME}:// store");
            }
            Client::connect(&config.store.uri)?
        }
    };
    client.ping().await.context("store is not reachable")?;

    let summary = match args.get_one::<PathBuf>("jobs") {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            dispatch_jobs(&config, client, Vec::new(), BufReader::new(file)).await?
        }
        None => {
            dispatch_jobs(&config, client, Vec::new(), BufReader::new(tokio::io::stdin())).await?
        }
    };

    let records = match (&memory, args.get_flag("dump")) {
        (Some(backend), true) => backend.snapshot(&Namespace::new(
            config.store.database.clone(),
            ATTRIBUTES_COLLECTION,
        )),
        _ => Vec::new(),
    };
    write_report(&mut std::io::stdout().lock(), &summary, &records)?;

    let code = summary.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Totals of one `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunSummary {
    stats: DispatchStats,
    rejected: usize,
}

impl RunSummary {
    /// Non-zero when any job faulted
    fn exit_code(&self) -> i32 {
        i32::from(self.stats.failed > 0)
    }
}

/// Run every job read from `reader` and wait for the dispatcher to drain
async fn dispatch_jobs<R>(
    config: &AmConfig,
    client: Client,
    extra: Vec<PluginSpec>,
    reader: R,
) -> anyhow::Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
{
    let manager = Arc::new(AttributeManager::from_config_with_client(config, client, extra));
    if manager.registry().is_empty() {
        tracing::warn!("no plugins loaded; every job will end as plugin_missing");
    }

    let dispatcher = JobDispatcher::new(manager, config.worker.max_concurrent_jobs);
    let (tx, rx) = mpsc::channel(dispatcher.max_concurrent_jobs() * 2);
    let worker = tokio::spawn(async move { dispatcher.run(rx).await });

    let fed = feed_jobs(reader, &tx).await;
    drop(tx);
    let stats = worker.await.context("dispatcher task failed")?;

    Ok(RunSummary {
        stats,
        rejected: fed?,
    })
}

/// Print totals, then each record as one JSON line
fn write_report(
    out: &mut impl Write,
    summary: &RunSummary,
    records: &[Document],
) -> std::io::Result<()> {
    writeln!(
        out,
        "applied={} skipped={} failed={} rejected={}",
        summary.stats.applied, summary.stats.skipped, summary.stats.failed, summary.rejected
    )?;
    for record in records {
        writeln!(out, "{}", Value::Object(record.clone()))?;
    }
    Ok(())
}

/// Send every decodable line to the dispatcher; returns the number of rejected lines
async fn feed_jobs<R>(reader: R, tx: &mpsc::Sender<UpdateJob>) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut rejected = 0;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match UpdateJob::from_json(line) {
            Ok(job) => {
                tracing::debug!(job = %job.id(), line = line_no, "queued");
                if tx.send(job).await.is_err() {
                    bail!("dispatcher stopped accepting jobs");
                }
            }
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "rejecting malformed job");
                rejected += 1;
            }
        }
    }
    Ok(rejected)
}

async fn seed_backend(backend: &MemoryBackend, path: &Path) -> anyhow::Result<usize> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let seed: BTreeMap<String, BTreeMap<String, Vec<Document>>> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let mut count = 0;
    for (database, collections) in seed {
        for (collection, docs) in collections {
            let ns = Namespace::new(database.clone(), collection);
            for doc in docs {
                backend
                    .insert_one(&ns, doc)
                    .await
                    .with_context(|| format!("seeding {ns}"))?;
                count += 1;
            }
        }
    }
    Ok(count)
}

fn check_config(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let specs = config.plugins.iter().cloned().map(am_plugins::PluginConfig::into_spec);
    let (registry, rejected) = PluginRegistry::load_reporting(specs);

    println!("store: {} (database {})", config.store.uri, config.store.database);
    println!("max concurrent jobs: {}", config.worker.max_concurrent_jobs);
    println!("plugins: {}", registry.names().join(", "));
    for err in &rejected {
        println!("  rejected: {err}");
    }

    if !rejected.is_empty() {
        bail!("{} plugin declaration(s) rejected", rejected.len());
    }
    Ok(())
}
