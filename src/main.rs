//! Stradella GW - accordion keyboard and bellows gesture to MIDI

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stradella_gw::cli::{spawn_repl, Repl};
use stradella_gw::dispatch::DispatchQueue;
use stradella_gw::input::{channel_callback, EngineClock, InputSource, ManualPointer, PointerPoller};
use stradella_gw::mapping::KeyMappingSet;
use stradella_gw::observer::{spawn_observer, Observer};
use stradella_gw::output::{print_ports, ConsoleSink, MidiSink, MidirSink};
use stradella_gw::{spawn_critical_path, AppConfig, Engine};

/// Stradella GW - play accordion bass from the computer keyboard
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// Output port name pattern (overrides config)
    #[arg(short, long)]
    port: Option<String>,

    /// MIDI channel 1-16 (overrides config)
    #[arg(long)]
    channel: Option<u8>,

    /// Log messages instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting Stradella GW v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        print_ports();
        return Ok(());
    }

    let mut config = load_config(&args.config).await?;
    if let Some(port) = args.port {
        config.midi.output_port = Some(port);
    }
    if let Some(channel) = args.channel {
        config.midi.channel = channel;
    }
    config.validate()?;

    let sink = open_sink(&config, args.dry_run);

    run_app(config, sink).await?;

    info!("Stradella GW shutdown complete");
    Ok(())
}

async fn run_app(config: AppConfig, sink: Box<dyn MidiSink>) -> Result<()> {
    // Observation path
    let queue = Arc::new(DispatchQueue::with_capacity(config.observer.pending_capacity));
    let mut observer = Observer::with_history(queue.clone(), config.observer.history);
    observer.set_listener(Box::new(|line: &str| println!("{}", line.dimmed())));
    let observer = observer.shared();
    let observer_task = spawn_observer(observer.clone(), config.observer.drain_hz);

    // Critical path
    let engine = Engine::new(&config, sink, queue);
    let (input_tx, input_rx) = crossbeam::channel::unbounded();
    let mut critical_path = spawn_critical_path(engine, input_rx)?;

    // Input sources
    let clock = EngineClock::new();
    let pointer = ManualPointer::new();
    let mut poller = PointerPoller::new(Arc::new(pointer.clone()), clock, config.expression.poll_hz);
    poller.start(channel_callback(input_tx.clone()))?;

    let mapping = KeyMappingSet::build_with_policy(config.keyboard.base_note, config.keyboard.range_policy);
    let repl = Repl::new(channel_callback(input_tx), pointer, clock, mapping, observer.clone());
    let repl_rx = spawn_repl(repl)?;

    tokio::select! {
        result = repl_rx => match result {
            Ok(Ok(())) => info!("REPL closed"),
            Ok(Err(e)) => warn!("REPL error: {}", e),
            Err(_) => warn!("REPL thread exited without a result"),
        },
        _ = shutdown_signal() => {}
    }

    info!("Shutting down...");
    poller.stop();

    if let Some(engine) = critical_path.stop() {
        info!(
            "Critical path stopped ({} key(s) still held)",
            engine.dispatcher().held_keys().len()
        );
    }

    observer_task.shutdown().await;

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist
async fn load_config(path: &str) -> Result<AppConfig> {
    if !Path::new(path).exists() {
        warn!("Configuration file {} not found, using defaults", path);
        return Ok(AppConfig::default());
    }

    let config = AppConfig::load(path).await?;
    info!("Configuration loaded from {}", path);
    Ok(config)
}

/// Pick the output: real port, log-only, or degraded (port missing)
fn open_sink(config: &AppConfig, dry_run: bool) -> Box<dyn MidiSink> {
    if dry_run {
        info!("Dry run: MIDI messages are logged only");
        return Box::new(ConsoleSink::new());
    }

    match config.midi.output_port.as_deref() {
        None => {
            warn!("No MIDI output port configured, messages are logged only");
            Box::new(ConsoleSink::new())
        }
        Some(pattern) => match MidirSink::connect(pattern) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                warn!("{} - continuing without MIDI output", e);
                Box::new(MidirSink::disconnected())
            }
        },
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
