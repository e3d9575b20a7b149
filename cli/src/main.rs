// blelink: BLE chunked transfer simulator
//
// Drives the transfer engine over an in-memory link so MTU, buffer depth,
// write mode, markers and pacing can be exercised without hardware.

mod config;

use anyhow::{Context, Result};
use blelink_core::{
    EndMarker, InboundMessage, LoopbackLink, Pacing, PeerId, PeerProfile, TransferConfig,
    TransferService, WriteMode,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Parser)]
#[command(name = "blelink")]
#[command(about = "BLE chunked data transfer simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages to simulated peripherals and verify what arrives
    Simulate(SimulateArgs),
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// Payload size in bytes
    #[arg(short, long, default_value = "512")]
    size: usize,
    /// Packet size limit (defaults to the configured mtu)
    #[arg(long)]
    mtu: Option<usize>,
    /// End-of-data marker as hex; empty disables it
    #[arg(long)]
    marker: Option<String>,
    /// Number of peripherals
    #[arg(short, long, default_value = "1")]
    peers: usize,
    /// Messages per peripheral
    #[arg(short, long, default_value = "3")]
    messages: usize,
    /// Packets the link buffers before pushing back
    #[arg(long)]
    buffer: Option<usize>,
    #[arg(long, value_enum)]
    write_mode: Option<WriteModeArg>,
    /// Pause every N bytes (needs --pace-ms)
    #[arg(long, requires = "pace_ms")]
    pace_every: Option<usize>,
    /// Pause length in milliseconds (needs --pace-every)
    #[arg(long, requires = "pace_every")]
    pace_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum WriteModeArg {
    BackToBack,
    OnePerReady,
}

impl From<WriteModeArg> for WriteMode {
    fn from(arg: WriteModeArg) -> Self {
        match arg {
            WriteModeArg::BackToBack => WriteMode::BackToBack,
            WriteModeArg::OnePerReady => WriteMode::OnePerReady,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print every setting
    Show,
    /// Print the config file location
    Path,
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Simulate(args) => cmd_simulate(args, config_path).await,
        Commands::Config { action } => cmd_config(action, config_path),
    }
}

fn load_config(path: Option<&Path>) -> Result<config::Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::Config::config_file()?,
    };
    tracing::debug!("Loading config from {}", path.display());
    config::Config::load_from(&path)
}

fn cmd_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path)?;
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", config::Config::config_file()?.display()),
        },

        ConfigAction::Set { key, value } => {
            let mut config = load_config(path)?;
            config.set(&key, &value)?;
            match path {
                Some(path) => config.save_to(path)?,
                None => config.save()?,
            }
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }
    }

    Ok(())
}

/// Lowercase letters, offset per message so payloads differ
fn make_payload(size: usize, seed: usize) -> Vec<u8> {
    (0..size).map(|i| b'a' + ((i + seed) % 26) as u8).collect()
}

struct Peripheral {
    id: PeerId,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    expected: Vec<Vec<u8>>,
}

async fn cmd_simulate(args: SimulateArgs, config_path: Option<&Path>) -> Result<()> {
    let settings = load_config(config_path)?;
    let mut transfer: TransferConfig = settings.transfer.clone();

    if let Some(marker) = &args.marker {
        transfer.end_marker = if marker.is_empty() {
            None
        } else {
            let bytes = hex::decode(marker).context("Marker must be hex encoded")?;
            EndMarker::new(bytes)
        };
    }
    if let (Some(every), Some(ms)) = (args.pace_every, args.pace_ms) {
        transfer.default_pacing = Some(Pacing::new(ms, every));
    }
    transfer.validate()?;

    let profile = PeerProfile {
        mtu: args.mtu.unwrap_or(settings.link.mtu),
        buffer_packets: args.buffer.unwrap_or(settings.link.buffer_packets),
        write_mode: args
            .write_mode
            .map(WriteMode::from)
            .unwrap_or(settings.link.write_mode),
    };
    if profile.mtu == 0 {
        anyhow::bail!("MTU must be positive");
    }

    println!("{}", "Simulating BLE transfers".bold());
    println!(
        "  {} peer(s) × {} message(s) of {} bytes, mtu {}, buffer {}, {}",
        args.peers,
        args.messages,
        args.size,
        profile.mtu,
        profile.buffer_packets,
        profile.write_mode
    );
    match &transfer.end_marker {
        Some(marker) => println!("  marker {}", hex::encode(marker.bytes()).bright_cyan()),
        None => println!("  {}", "no end marker: each packet is a message".yellow()),
    }
    if let Some(pacing) = transfer.default_pacing {
        println!(
            "  pacing {}ms every {} bytes",
            pacing.delay_ms, pacing.bytes_between_delay
        );
    }
    println!();

    let (central_tx, central_rx) = mpsc::unbounded_channel();
    let link = LoopbackLink::new(PeerId::from("central"), central_tx);
    let (service, handle, _inbound) =
        TransferService::new(link.clone(), transfer.clone(), central_rx)?;
    let central = service.spawn();

    let mut peripherals = Vec::with_capacity(args.peers);
    for i in 0..args.peers {
        let id = PeerId::new(format!("peripheral-{}", i));
        let (tx, rx) = mpsc::unbounded_channel();
        let peer_link = LoopbackLink::new(id.clone(), tx.clone());
        let (peer_service, _peer_handle, inbound) =
            TransferService::new(peer_link, transfer.clone(), rx)?;
        peer_service.spawn();
        link.connect(id.clone(), profile, Some(tx));
        peripherals.push(Peripheral {
            id,
            inbound,
            expected: Vec::new(),
        });
    }
    let air = tokio::spawn(
        link.clone()
            .run_air(Duration::from_millis(settings.link.tick_ms.max(1))),
    );

    let started = Instant::now();
    let mut pending = Vec::new();
    for m in 0..args.messages {
        for (p, peripheral) in peripherals.iter_mut().enumerate() {
            let payload = make_payload(args.size, m * 7 + p);
            peripheral.expected.push(payload.clone());
            pending.push(handle.send(payload, peripheral.id.clone(), None).await?);
        }
    }

    let mut failed = 0;
    let mut bytes = 0;
    for in_flight in pending {
        let id = in_flight.id();
        let outcome = in_flight.wait().await?;
        match &outcome.result {
            Ok(()) => {
                bytes += outcome.payload.len();
                println!(
                    "  {} {} → {} ({} bytes)",
                    "✓".green(),
                    id,
                    outcome.destination,
                    outcome.payload.len()
                );
            }
            Err(e) => {
                failed += 1;
                println!("  {} {} → {}: {}", "✗".red(), id, outcome.destination, e);
            }
        }
    }
    let elapsed = started.elapsed();

    println!();
    let mut mismatched = 0;
    for peripheral in &mut peripherals {
        let received = collect_inbound(peripheral, transfer.end_marker.is_some()).await?;
        if received == peripheral.expected {
            println!(
                "  {} {} reassembled {} message(s)",
                "✓".green(),
                peripheral.id,
                received.len()
            );
        } else {
            mismatched += 1;
            println!(
                "  {} {} payload mismatch ({} message(s) received)",
                "✗".red(),
                peripheral.id,
                received.len()
            );
        }
    }

    handle.shutdown();
    central.await.context("Central service panicked")?;
    air.abort();

    println!();
    println!(
        "{} {} bytes in {:.1?} ({} failed, {} mismatched)",
        "Done:".bold(),
        bytes,
        elapsed,
        failed,
        mismatched
    );
    if failed > 0 || mismatched > 0 {
        anyhow::bail!("Simulation finished with errors");
    }
    Ok(())
}

/// Read back what a peripheral received. Without a marker every packet
/// is its own message, so the bytes are compared as one stream.
async fn collect_inbound(peripheral: &mut Peripheral, framed: bool) -> Result<Vec<Vec<u8>>> {
    let wait = Duration::from_secs(5);
    if framed {
        let mut messages = Vec::with_capacity(peripheral.expected.len());
        for _ in 0..peripheral.expected.len() {
            match timeout(wait, peripheral.inbound.recv()).await {
                Ok(Some(message)) => messages.push(message.payload),
                Ok(None) | Err(_) => break,
            }
        }
        return Ok(messages);
    }

    let total: usize = peripheral.expected.iter().map(Vec::len).sum();
    let mut stream = Vec::with_capacity(total);
    while stream.len() < total {
        match timeout(wait, peripheral.inbound.recv()).await {
            Ok(Some(message)) => stream.extend(message.payload),
            Ok(None) | Err(_) => break,
        }
    }
    let expected_stream = peripheral.expected.concat();
    if stream == expected_stream {
        Ok(peripheral.expected.clone())
    } else {
        Ok(vec![stream])
    }
}
