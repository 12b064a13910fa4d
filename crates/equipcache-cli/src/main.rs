//! equipcache - load an equipment reference dataset and answer lookups.
//!
//! Populates the reference cache from a JSON file the same way the
//! application does at startup, prints per-kind load status, and resolves any
//! ids or locations given on the command line.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use equipcache_core::{CacheConfig, CacheStatus, EntityKind, JsonFileSource, ReferenceCache};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: equipcache <data.json> [options]

Options:
  --config <file>        Read cache settings from <file>
  --timeout-ms <n>       Wait at most <n> ms for the cache to become ready
  --room <id>            Print the name of room <id>
  --line <id>            Print the name of line <id>
  --manufacturer <id>    Print the name of manufacturer <id>
  --type <id>            Print the name of type <id>
  --rooms-at <location>  List room ids at <location>
  --lines-at <location>  List line ids at <location>
  -h, --help             Show this help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Name(EntityKind, i64),
    RoomsAt(i64),
    LinesAt(i64),
}

#[derive(Debug, Default)]
struct Args {
    data_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    timeout: Option<Duration>,
    queries: Vec<Query>,
    help: bool,
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next().ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn next_number(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<i64> {
    let value = next_value(iter, flag)?;
    value
        .parse()
        .with_context(|| format!("{} expects a number, got '{}'", flag, value))
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    let mut iter = raw.into_iter();

    while let Some(arg) = iter.next() {
        let it = &mut iter;
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            "--config" => args.config_path = Some(PathBuf::from(next_value(it, "--config")?)),
            "--timeout-ms" => {
                let ms = next_number(it, "--timeout-ms")?;
                if ms < 0 {
                    bail!("--timeout-ms must not be negative");
                }
                args.timeout = Some(Duration::from_millis(ms as u64));
            }
            "--room" => args.queries.push(Query::Name(EntityKind::Room, next_number(it, "--room")?)),
            "--line" => args.queries.push(Query::Name(EntityKind::Line, next_number(it, "--line")?)),
            "--manufacturer" => args.queries.push(Query::Name(
                EntityKind::Manufacturer,
                next_number(it, "--manufacturer")?,
            )),
            "--type" => args.queries.push(Query::Name(EntityKind::Type, next_number(it, "--type")?)),
            "--rooms-at" => args.queries.push(Query::RoomsAt(next_number(it, "--rooms-at")?)),
            "--lines-at" => args.queries.push(Query::LinesAt(next_number(it, "--lines-at")?)),
            flag if flag.starts_with('-') => bail!("Unknown option: {}", flag),
            path => {
                if args.data_path.is_some() {
                    bail!("Only one data file may be given");
                }
                args.data_path = Some(PathBuf::from(path));
            }
        }
    }
    Ok(args)
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes buffered log lines when dropped.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

fn load_config(path: Option<&PathBuf>) -> Result<CacheConfig> {
    let config = match path {
        Some(path) => CacheConfig::load_from(path)?,
        None => CacheConfig::load()?,
    };
    Ok(config.apply_env_overrides())
}

fn print_status(status: &CacheStatus) {
    println!("Overall: {}", status.overall);
    for kind in &status.kinds {
        let loaded = kind
            .loaded_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<14} {:<12} {:>6} records  loaded {}",
            kind.kind.display_name(),
            kind.state.to_string(),
            kind.record_count,
            loaded
        );
        if let Some(ref error) = kind.last_error {
            println!("    error: {}", error);
        }
    }
}

fn format_ids(ids: &[i64]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    }
}

fn answer(cache: &ReferenceCache, query: Query) {
    match query {
        Query::Name(kind, id) => println!("{} {}: {}", kind, id, cache.display_name(kind, id)),
        Query::RoomsAt(location) => {
            println!("rooms at {}: {}", location, format_ids(&cache.rooms_at_location(location)))
        }
        Query::LinesAt(location) => {
            println!("lines at {}: {}", location, format_ids(&cache.lines_at_location(location)))
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let data_path = args
        .data_path
        .ok_or_else(|| anyhow!("No data file given\n\n{}", USAGE))?;
    let config = load_config(args.config_path.as_ref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let source = Arc::new(JsonFileSource::new(data_path));
    info!(path = %source.path().display(), "Loading reference data");
    let cache = ReferenceCache::with_handle(source, config, runtime.handle().clone())?;
    let timeout = args.timeout.unwrap_or_else(|| cache.config().wait_timeout());

    cache.initialize();
    let ready = cache.wait_until_ready(Some(timeout));

    print_status(&cache.status());
    if !ready {
        match cache.last_error() {
            Some(error) => eprintln!("Warning: reference data incomplete: {}", error),
            None => eprintln!("Warning: timed out after {} ms", timeout.as_millis()),
        }
    }

    for query in args.queries {
        answer(&cache, query);
    }

    cache.shutdown();
    Ok(ready)
}

fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
