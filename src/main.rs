//! Climate View CLI
//!
//! Query a reading log and run the refresh loop from the terminal.

use anyhow::Context;
use clap::{Parser, Subcommand};
use climate_view_engine::{
    config::Config,
    core::{FieldSet, TimeRange, WindowWidth},
    Coordinator, Dashboard, DashboardEvent, Engine, JsonlStore, Trigger, ViewOutcome, ViewResult,
    VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "climate-view")]
#[command(version = VERSION)]
#[command(about = "Smoothed series and statistics over temperature/humidity readings", long_about = None)]
struct Cli {
    /// Reading log to query (overrides the configured store path)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the smoothed series
    Smooth {
        /// Samples on each side of a point (window = 2k+1)
        #[arg(long, short = 'k', allow_negative_numbers = true)]
        half_window: Option<i64>,
    },

    /// Print average/maximum/minimum statistics
    Stats {
        /// Start of the range (inclusive)
        #[arg(long)]
        start: Option<String>,

        /// End of the range (inclusive)
        #[arg(long)]
        end: Option<String>,

        /// Fields to summarise (temperature, humidity, or all)
        #[arg(long, default_value = "all")]
        fields: String,
    },

    /// Print the timestamp of the newest reading
    LastUpdate,

    /// Keep all views refreshed and print every update
    Watch {
        /// Refresh interval in seconds (overrides the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Serve the queries over HTTP (requires server feature)
    Serve {
        /// Port to listen on (overrides the configured port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the configuration file
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load().context("loading configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    match cli.command {
        Commands::Smooth { half_window } => cmd_smooth(&config, half_window, cli.json),
        Commands::Stats { start, end, fields } => {
            cmd_stats(&config, start.as_deref(), end.as_deref(), &fields, cli.json)
        }
        Commands::LastUpdate => cmd_last_update(&config, cli.json),
        Commands::Watch { interval } => cmd_watch(&config, interval),
        Commands::Serve { port } => cmd_serve(&config, port),
        Commands::Config { init } => cmd_config(&config, init),
    }
}

fn engine(config: &Config) -> Engine {
    Engine::new(Arc::new(JsonlStore::open(&config.store_path)))
}

fn cmd_smooth(config: &Config, half_window: Option<i64>, json: bool) -> anyhow::Result<()> {
    let width = match half_window {
        Some(k) => WindowWidth::new(k)?,
        None => WindowWidth::from(config.default_half_window),
    };
    let series = engine(config).smooth(width)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }

    println!(
        "{:<26}{:>10}{:>12}{:>10}{:>12}",
        "timestamp", "temp", "temp~", "hum", "hum~"
    );
    for point in &series.points {
        println!(
            "{:<26}{:>10.1}{:>12.2}{:>10.1}{:>12.2}",
            point.timestamp.format("%Y-%m-%d %H:%M:%S"),
            point.temperature,
            point.smoothed_temperature,
            point.humidity,
            point.smoothed_humidity
        );
    }
    println!("{} readings, half-window {}", series.len(), width);
    Ok(())
}

fn cmd_stats(
    config: &Config,
    start: Option<&str>,
    end: Option<&str>,
    fields: &str,
    json: bool,
) -> anyhow::Result<()> {
    let range = TimeRange::from_bounds(start, end)?;
    let summary = engine(config).stats(range.as_ref(), FieldSet::from_csv(fields))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.to_table());
        println!("{} readings", summary.reading_count);
    }
    Ok(())
}

fn cmd_last_update(config: &Config, json: bool) -> anyhow::Result<()> {
    let last = engine(config).last_update()?;

    if json {
        println!("{}", serde_json::json!({ "last_update": last }));
    } else {
        match last {
            Some(t) => println!("{}", t.format("%Y-%m-%d %H:%M:%S")),
            None => println!("no readings"),
        }
    }
    Ok(())
}

fn cmd_watch(config: &Config, interval: Option<u64>) -> anyhow::Result<()> {
    let refresh = interval
        .map(Duration::from_secs)
        .unwrap_or(config.refresh_interval);
    if refresh.is_zero() {
        anyhow::bail!("refresh interval must be at least one second");
    }

    println!("Climate View v{VERSION}");
    println!("  Store: {}", config.store_path.display());
    println!("  Refresh interval: {}s", refresh.as_secs());
    println!("  Half-window: {}", config.default_half_window);
    println!();
    println!("Type a half-window (e.g. 20) or a range (start,end; empty to clear).");
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("installing Ctrl+C handler")?;

    let coordinator = Coordinator::shared(engine(config), config.coordinator());
    let handle = Dashboard::new(coordinator, refresh)
        .with_running_flag(running.clone())
        .spawn();

    // Parameter changes typed on stdin.
    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    // Held here so the channel stays open (and quiet) after stdin closes.
    let _line_tx = line_tx.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines().map_while(Result::ok) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    while running.load(Ordering::SeqCst) {
        crossbeam_channel::select! {
            recv(handle.events()) -> event => match event {
                Ok(event) => print_event(&event),
                Err(_) => break,
            },
            recv(line_rx) -> line => {
                if let Ok(line) = line {
                    match parse_input(&line) {
                        Ok(trigger) => handle.trigger(trigger),
                        Err(e) => eprintln!("{e}"),
                    }
                }
            },
            default(Duration::from_millis(200)) => {}
        }
    }

    println!();
    println!("Stopping...");
    handle.stop();
    Ok(())
}

/// Map a line of user input to a trigger.
fn parse_input(line: &str) -> anyhow::Result<Trigger> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Trigger::VisibleRangeChanged(None));
    }
    if let Some((start, end)) = line.split_once(',') {
        let range = TimeRange::from_bounds(Some(start), Some(end))?;
        return Ok(Trigger::VisibleRangeChanged(range));
    }
    let k: i64 = line
        .parse()
        .with_context(|| format!("expected a half-window or 'start,end', got '{line}'"))?;
    Ok(Trigger::WindowWidthChanged(k))
}

fn print_event(event: &DashboardEvent) {
    let update = match event {
        DashboardEvent::Update(update) => update,
        DashboardEvent::Rejected { trigger, error } => {
            eprintln!("Ignored {trigger:?}: {error}");
            return;
        }
    };

    let now = chrono::Utc::now().format("%H:%M:%S");
    for outcome in &update.outcomes {
        match outcome {
            ViewOutcome::Updated(ViewResult::SmoothedSeries(series)) => {
                let latest = series.points.last().map_or_else(
                    || "no readings".to_string(),
                    |p| {
                        format!(
                            "latest {:.2} °C / {:.2} %",
                            p.smoothed_temperature, p.smoothed_humidity
                        )
                    },
                );
                println!(
                    "[{now}] Series: {} points, half-window {} | {latest}",
                    series.len(),
                    series.half_window
                );
            }
            ViewOutcome::Updated(ViewResult::StatsTable(stats)) => {
                let scope = match stats.range {
                    Some(range) => format!(
                        "{} .. {}",
                        range.start.format("%Y-%m-%d %H:%M:%S"),
                        range.end.format("%Y-%m-%d %H:%M:%S")
                    ),
                    None => "all readings".to_string(),
                };
                println!("[{now}] Stats ({scope}):");
                print!("{}", stats.summary.to_table());
            }
            ViewOutcome::Updated(ViewResult::Freshness(freshness)) => match freshness.last_update {
                Some(t) => println!("[{now}] Last update: {}", t.format("%Y-%m-%d %H:%M:%S")),
                None => println!("[{now}] Last update: no readings"),
            },
            ViewOutcome::Superseded { .. } => {}
            ViewOutcome::Failed { view, error } => {
                eprintln!("[{now}] Could not refresh {view}: {error}");
            }
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    use climate_view_engine::server::{self, ServerConfig};

    let host = config
        .server_host
        .parse()
        .with_context(|| format!("invalid server_host '{}'", config.server_host))?;
    let server_config = ServerConfig {
        default_half_window: WindowWidth::from(config.default_half_window),
        max_half_window: config.max_half_window,
        ..ServerConfig::new(host, port.unwrap_or(config.server_port))
    };

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(async {
        let (addr, shutdown_tx) = server::run(engine(config), server_config).await?;
        println!("Climate View API listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_config: &Config, _port: Option<u16>) -> anyhow::Result<()> {
    anyhow::bail!("serve requires the server feature (rebuild with --features server)")
}

fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        config.save().context("writing configuration")?;
        println!("Wrote {}", Config::config_path().display());
        return Ok(());
    }

    println!("Configuration file: {}", Config::config_path().display());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
