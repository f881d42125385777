//! # Telemetry Recorder
//!
//! Records schema-driven telemetry to numbered binary log files and mirrors
//! every record over a UDP downlink; the same binary runs the ground side
//! and inspects stored logs.
//!
//! # Usage
//!
//! Record (or receive, with `role = "ground"` in the config):
//! ```bash
//! telemetry-recorder run
//! ```
//!
//! Inspect stored logs:
//! ```bash
//! telemetry-recorder ls
//! telemetry-recorder dump 3 > flight.csv
//! telemetry-recorder hexdump 3
//! telemetry-recorder delete 3
//! telemetry-recorder format --yes
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use telemetry_recorder::config::{Config, LinkRole};
use telemetry_recorder::logfile::csv::{render_csv_header, render_csv_row};
use telemetry_recorder::logfile::format::file_name;
use telemetry_recorder::logfile::{FsStorage, LogStore};
use telemetry_recorder::record::Schema;
use telemetry_recorder::session::{Session, SessionStats};
use telemetry_recorder::transport::{Packet, TransportQueue, UdpLink};

/// Config file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of records between status log messages
const STATUS_INTERVAL_RECORDS: u64 = 100;

/// Prefix of rolling diagnostic log files
const LOG_FILE_PREFIX: &str = "telemetry-recorder.log";

#[derive(Parser, Debug)]
#[command(name = "telemetry-recorder", version)]
#[command(about = "Schema-driven telemetry recorder with live downlink", long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults are used if it does not exist
    #[arg(long, short, env = "TELEMETRY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Record and transmit, or receive on the ground (default)
    Run,

    /// List stored log files with their sizes
    Ls,

    /// Replay a log file as CSV, or every log file if no ID is given
    Dump {
        id: Option<u32>,
    },

    /// Show a log file as raw hex
    Hexdump {
        id: u32,
    },

    /// Delete one log file
    Delete {
        id: u32,
    },

    /// Delete every log file
    Format {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, from_file) = load_config(&cli.config)?;
    let _log_guard = init_logging(&config)?;

    if from_file {
        info!("Loaded configuration from {}", cli.config.display());
    } else {
        warn!("{} not found, using built-in defaults", cli.config.display());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => match config.link.role {
            LinkRole::Recorder => run_recorder(&config).await,
            LinkRole::Ground => run_ground(&config).await,
        },
        Commands::Ls => list_logs(&config),
        Commands::Dump { id } => dump_logs(&config, id),
        Commands::Hexdump { id } => {
            print!("{}", open_store(&config).hexdump(id)?);
            Ok(())
        }
        Commands::Delete { id } => {
            if !open_store(&config).delete(id)? {
                bail!("Log {} does not exist", file_name(id));
            }
            println!("Deleted {}", file_name(id));
            Ok(())
        }
        Commands::Format { yes } => {
            if !yes {
                bail!("format deletes every log file; pass --yes to confirm");
            }
            let deleted = open_store(&config).clear()?;
            println!("Deleted {} log files", deleted);
            Ok(())
        }
    }
}

/// Load the config file, or defaults when it does not exist
///
/// Returns the config and whether it came from the file.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config::default(), false));
    }
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((config, true))
}

/// Log to stderr, plus daily rolling files when a directory is configured
///
/// Keep the returned guard alive to flush file output on exit.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

fn open_store(config: &Config) -> LogStore<FsStorage> {
    LogStore::new(FsStorage::new(), &config.storage.log_dir)
}

/// Bytes still available on the volume holding the log directory
fn free_space(dir: &Path) -> Option<u64> {
    match fs2::available_space(dir) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Failed to query free space of {}: {}", dir.display(), e);
            None
        }
    }
}

fn status_line(stats: &SessionStats, incomplete: u64) -> String {
    format!(
        "Committed {} records ({} persisted, {} transmitted, {} incomplete)",
        stats.commits, stats.records_persisted, stats.records_transmitted, incomplete
    )
}

/// Sample, record and transmit until Ctrl+C
async fn run_recorder(config: &Config) -> Result<()> {
    info!("Telemetry recorder v{} starting...", env!("CARGO_PKG_VERSION"));

    let schema = Arc::new(config.schema()?);
    let mut store = open_store(config);
    let logs = store.list()?;
    info!(
        "{} holds {} log files, {} bytes",
        config.storage.log_dir,
        logs.len(),
        logs.iter().map(|log| log.size).sum::<u64>()
    );
    if let Some(free) = free_space(Path::new(&config.storage.log_dir)) {
        info!("{} bytes free for logs", free);
    }

    let transport = if config.link.enabled {
        let link = UdpLink::bind(config.link.bind_addr()?)
            .await
            .context("Failed to bind downlink")?;
        Some(TransportQueue::sender(Box::new(link), config.link.peer_address()?))
    } else {
        info!("Downlink disabled");
        None
    };

    let mut session = Session::start(schema, store, transport, config.storage.flush_interval())?;

    let timestamp_field = Some(config.sampler.timestamp_field.as_str()).filter(|f| !f.is_empty());
    let started = Instant::now();
    let mut sample_interval = interval(config.sampler.sample_interval());
    let mut flush_interval = interval(config.storage.flush_interval());
    let mut incomplete = 0u64;

    info!(
        "Sampling every {} ms into log {}",
        config.sampler.sample_interval_ms,
        session.current_log_id()
    );
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = sample_interval.tick() => {
                // Other fields are filled in by the vehicle's sensor hooks
                if let Some(field) = timestamp_field {
                    session.set_value(field, &[started.elapsed().as_millis() as f64])?;
                }

                // Failed halves are already logged by the session
                if !session.commit().is_complete() {
                    incomplete += 1;
                }

                let stats = session.stats();
                if stats.commits % STATUS_INTERVAL_RECORDS == 0 {
                    info!("{}", status_line(&stats, incomplete));
                }
            }

            _ = flush_interval.tick() => {
                if let Err(e) = session.maybe_flush(Instant::now()) {
                    warn!("Failed to flush log {}: {}", session.current_log_id(), e);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.flush()?;
    let stats = session.stats();
    info!(
        "Recorded {} records to log {} ({} persist failures, {} transmit failures)",
        stats.records_persisted,
        session.current_log_id(),
        stats.persist_failures,
        stats.transmit_failures
    );

    Ok(())
}

/// Print every received record as CSV until Ctrl+C
async fn run_ground(config: &Config) -> Result<()> {
    info!("Ground station v{} starting...", env!("CARGO_PKG_VERSION"));

    let schema = config.schema()?;
    let mut link = UdpLink::bind(config.link.bind_addr()?)
        .await
        .context("Failed to bind downlink")?;
    let transport = TransportQueue::receiver(&mut link, config.link.capacity());

    let mut stdout = io::stdout();
    write!(stdout, "{}", ground_header(&schema))?;
    stdout.flush()?;

    let mut received: u64 = 0;
    loop {
        tokio::select! {
            packet = transport.recv() => {
                let Some(packet) = packet else { break };
                received += 1;

                match ground_row(&schema, &packet) {
                    Ok(row) => {
                        write!(stdout, "{}", row)?;
                        stdout.flush()?;
                    }
                    Err(e) => warn!("Undecodable packet from {}: {}", packet.source, e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let dropped = transport.queue().map_or(0, |queue| queue.dropped());
    info!("Received {} packets ({} dropped)", received, dropped);
    Ok(())
}

/// CSV header of the ground display: record columns plus packet metadata
fn ground_header(schema: &Schema) -> String {
    format!("{},length,source\n", render_csv_header(schema).trim_end())
}

/// One ground display row for a received packet
fn ground_row(schema: &Schema, packet: &Packet) -> Result<String> {
    let row = render_csv_row(schema, &packet.payload)?;
    Ok(format!(
        "{},{},{}\n",
        row.trim_end(),
        packet.len(),
        packet.source
    ))
}

fn list_logs(config: &Config) -> Result<()> {
    let mut store = open_store(config);
    let logs = store.list()?;
    for log in &logs {
        println!("{}  {:>10} bytes", file_name(log.id), log.size);
    }
    println!(
        "{} files, {} bytes",
        logs.len(),
        logs.iter().map(|log| log.size).sum::<u64>()
    );
    Ok(())
}

fn dump_logs(config: &Config, id: Option<u32>) -> Result<()> {
    let mut store = open_store(config);
    let mut out = io::BufWriter::new(io::stdout().lock());

    match id {
        Some(id) => {
            let rows = store
                .dump_csv(id, &mut out)
                .with_context(|| format!("Failed to dump {}", file_name(id)))?;
            info!("Dumped {} records from {}", rows, file_name(id));
        }
        None => {
            let dumped = store.dump_all_csv(&mut out)?;
            info!("Dumped {} log files", dumped.len());
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_recorder::record::{FieldDef, FieldType};
    use std::time::Duration;
    use telemetry_recorder::transport::MacAddress;

    fn example_schema() -> Schema {
        Schema::finalize(vec![
            FieldDef::new(FieldType::U32, "t", 1.0),
            FieldDef::new(FieldType::I16, "h", 10.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["telemetry-recorder"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["telemetry-recorder", "dump"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Dump { id: None }));

        let cli = Cli::try_parse_from(["telemetry-recorder", "dump", "3"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Dump { id: Some(3) }));

        let cli = Cli::try_parse_from(["telemetry-recorder", "format", "--yes"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Format { yes: true }));

        let cli = Cli::try_parse_from(["telemetry-recorder", "-c", "alt.toml", "ls"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert_eq!(cli.command, Some(Commands::Ls));
    }

    #[test]
    fn test_hexdump_requires_id() {
        assert!(Cli::try_parse_from(["telemetry-recorder", "hexdump"]).is_err());
        assert!(Cli::try_parse_from(["telemetry-recorder", "delete", "x"]).is_err());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let (config, from_file) = load_config(Path::new("/nonexistent/telemetry.toml")).unwrap();
        assert!(!from_file);
        assert_eq!(config.storage.log_dir, "./telem");
    }

    #[test]
    fn test_ground_output() {
        let schema = example_schema();
        let packet = Packet::new(
            MacAddress([0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]),
            &[0xE8, 0x03, 0x00, 0x00, 0x7B, 0x00],
        );

        assert_eq!(ground_header(&schema), "t,h,length,source\n");
        assert_eq!(
            ground_row(&schema, &packet).unwrap(),
            "1000,     12.3,6,24:6F:28:01:02:03\n"
        );
    }

    #[test]
    fn test_status_line_counts_incomplete_commits() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(FsStorage::new(), dir.path());
        let mut session =
            Session::start(Arc::new(example_schema()), store, None, Duration::from_millis(500))
                .unwrap();

        let mut incomplete = 0u64;
        session.set_value("t", &[1000.0]).unwrap();
        if !session.commit().is_complete() {
            incomplete += 1;
        }
        assert_eq!(incomplete, 0);
        assert_eq!(
            status_line(&session.stats(), 2),
            "Committed 1 records (1 persisted, 0 transmitted, 2 incomplete)"
        );
    }

    #[test]
    fn test_free_space_of_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(free_space(dir.path()).unwrap() > 0);
        assert_eq!(free_space(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_short_packet_rejected() {
        let packet = Packet::new(MacAddress::BROADCAST, &[0xE8, 0x03]);
        assert!(ground_row(&example_schema(), &packet).is_err());
    }
}
