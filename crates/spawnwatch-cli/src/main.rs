mod config;
mod sink;
mod telemetry;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use spawnwatch_contracts::events::JournalWriter;
use spawnwatch_engine::{
    IdentificationStore, ImageFetcher, ImageSource, InboundMessage, SpawnWatcher, WatchJob,
    WatcherSettings,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::sink::{ReplySink, RestSink, StdoutSink};

const QUEUED_JOBS_PER_WORKER: usize = 16;

#[derive(Debug, Parser)]
#[command(
    name = "spawnwatch",
    version,
    about = "Names spawned Pokemon from chat and learns from catch confirmations"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read chat messages as JSON lines on stdin and answer spawns.
    Watch(WatchArgs),
    /// Try to name the Pokemon in an image.
    Identify(IdentifyArgs),
    /// Record the name of the Pokemon in an image.
    Learn(LearnArgs),
    /// List every learned name.
    Names(StoreArgs),
    /// Show the record kept for one name.
    Info(InfoArgs),
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct WatchArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print replies on stdout instead of posting them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct IdentifyArgs {
    /// Image path or http(s) URL.
    #[arg(long)]
    image: String,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Args)]
struct LearnArgs {
    /// Image path or http(s) URL.
    #[arg(long)]
    image: String,
    #[arg(long)]
    name: String,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Args)]
struct InfoArgs {
    name: String,
    #[command(flatten)]
    store: StoreArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spawnwatch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = Config::load();
    telemetry::init_tracing(&config.log_filter, config.log_json);
    for warning in &config.warnings {
        warn!("{warning}");
    }

    match cli.command {
        Command::Watch(args) => run_watch(args, &config),
        Command::Identify(args) => run_identify(args, &config),
        Command::Learn(args) => run_learn(args, &config),
        Command::Names(args) => run_names(args, &config),
        Command::Info(args) => run_info(args, &config),
    }
}

fn open_store(args: &StoreArgs, config: &Config) -> IdentificationStore {
    let path = args
        .database
        .clone()
        .unwrap_or_else(|| config.database.clone());
    IdentificationStore::open(path)
}

fn run_watch(args: WatchArgs, config: &Config) -> Result<i32> {
    let sink: Box<dyn ReplySink> = if args.dry_run {
        Box::new(StdoutSink)
    } else {
        Box::new(RestSink::new(&config.api_base, config.require_token()?))
    };

    let store = open_store(&args.store, config);
    let fetcher = ImageFetcher::new(config.fetch_timeout)?;
    let mut watcher = SpawnWatcher::new(
        store,
        fetcher,
        WatcherSettings {
            game_bot_id: config.game_bot_id.clone(),
            self_id: config.self_id.clone(),
        },
    );
    if let Some(events) = args.events.or_else(|| config.events.clone()) {
        watcher = watcher.with_journal(JournalWriter::new(events));
    }

    info!(
        database = %watcher.store().path().display(),
        game_bot_id = %config.game_bot_id,
        dry_run = args.dry_run,
        "starting Pokemon Identifier Bot"
    );

    serve(io::stdin().lock(), &watcher, sink.as_ref(), config.workers)
        .context("failed reading inbound messages")?;

    info!("inbound stream closed; shutting down");
    Ok(0)
}

/// Answers every message on `reader` until it ends.
///
/// Command replies are sent inline; identify/learn jobs go through a bounded
/// queue to `workers` threads, so a burst of spawns blocks reading instead of
/// piling up threads.
fn serve<R: BufRead, S: ImageSource>(
    reader: R,
    watcher: &SpawnWatcher<S>,
    sink: &dyn ReplySink,
    workers: usize,
) -> io::Result<()> {
    let workers = workers.max(1);
    let (jobs, queue) = mpsc::sync_channel::<WatchJob>(workers * QUEUED_JOBS_PER_WORKER);
    let queue = Mutex::new(queue);
    let queue = &queue;
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(move || loop {
                let next = queue.lock().unwrap_or_else(PoisonError::into_inner).recv();
                let Ok(job) = next else {
                    return;
                };
                complete_job(watcher, sink, job);
            });
        }

        let pumped = pump_inbound(reader, |message| match watcher.accept(&message) {
            None => {}
            Some(job @ WatchJob::Respond(_)) => complete_job(watcher, sink, job),
            Some(job) => {
                if jobs.send(job).is_err() {
                    warn!("job queue closed; dropping job");
                }
            }
        });
        // Workers exit once the sender is gone and the queue drains.
        drop(jobs);
        pumped
    })
}

fn complete_job<S: ImageSource>(watcher: &SpawnWatcher<S>, sink: &dyn ReplySink, job: WatchJob) {
    let Some(reply) = watcher.run(job) else {
        return;
    };
    if let Err(err) = sink.deliver(&reply) {
        warn!(channel_id = %reply.channel_id, error = %format!("{err:#}"), "failed to deliver reply");
    }
}

/// Feeds every decodable line of `reader` to `handle`, in order.
///
/// Lines that are not UTF-8 or not a valid message are logged and skipped;
/// only a failing read ends the loop early.
fn pump_inbound<R: BufRead>(reader: R, mut handle: impl FnMut(InboundMessage)) -> io::Result<()> {
    for (index, chunk) in reader.split(b'\n').enumerate() {
        let bytes = chunk?;
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(err) => {
                warn!(line_number = index + 1, error = %err, "skipping inbound line that is not UTF-8");
                continue;
            }
        };
        if let Some(message) = parse_inbound_line(&line) {
            handle(message);
        }
    }
    Ok(())
}

fn parse_inbound_line(line: &str) -> Option<InboundMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<InboundMessage>(trimmed) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(error = %err, "skipping malformed inbound message");
            None
        }
    }
}

fn run_identify(args: IdentifyArgs, config: &Config) -> Result<i32> {
    let fetcher = ImageFetcher::new(config.fetch_timeout)?.with_local_files();
    let bytes = match fetcher.fetch(&args.image) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("{err}");
            return Ok(2);
        }
    };
    let store = open_store(&args.store, config);
    let identification = store.identify(&bytes);
    println!("{}", identification.message);
    Ok(if identification.name.is_some() { 0 } else { 2 })
}

fn run_learn(args: LearnArgs, config: &Config) -> Result<i32> {
    let name = args.name.trim();
    if name.is_empty() {
        bail!("--name must not be empty");
    }
    let fetcher = ImageFetcher::new(config.fetch_timeout)?.with_local_files();
    let bytes = match fetcher.fetch(&args.image) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("{err}");
            return Ok(1);
        }
    };
    let store = open_store(&args.store, config);
    let outcome = store.learn(&bytes, name);
    println!("{}", outcome.message);
    Ok(if outcome.success { 0 } else { 1 })
}

fn run_names(args: StoreArgs, config: &Config) -> Result<i32> {
    let store = open_store(&args, config);
    for name in store.known_names() {
        println!("{name}");
    }
    Ok(0)
}

fn run_info(args: InfoArgs, config: &Config) -> Result<i32> {
    let store = open_store(&args.store, config);
    match store.name_info(&args.name) {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        None => {
            eprintln!("I haven't learned {} yet.", args.name);
            Ok(2)
        }
    }
}
