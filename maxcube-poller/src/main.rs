//! MAX! Cube poller entry point.
//!
//! ```text
//! maxcube-poller                          Poll in the foreground
//! maxcube-poller status [--json]          Print one snapshot
//! maxcube-poller check                    Print the gateway identity
//! maxcube-poller set <rf> --mode <m> [--temperature <t>]
//! maxcube-poller temp <rf> <celsius>      Manual setpoint, clamped
//! maxcube-poller preset <rf> <preset>     boost|comfort|eco|away|on
//! maxcube-poller hvac <rf> <mode>         off|auto|heat
//! maxcube-poller --config <path>          Load a custom config TOML
//! maxcube-poller --gen-config             Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use maxcube_core::climate::{HvacMode, Preset};
use maxcube_core::{Mode, RfAddress};
use maxcube_poller::actions::{self, Action};
use maxcube_poller::config::PollerConfig;
use maxcube_poller::service::PollerService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "maxcube-poller", about = "MAX! Cube polling service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "maxcube-poller.toml")]
    config: PathBuf,

    /// Gateway host, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Gateway port, overriding the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll until Ctrl-C.
    Run,
    /// Print one snapshot and exit.
    Status {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Connect, print the gateway identity and exit.
    Check,
    /// Send a raw mode/temperature command.
    Set {
        rf_address: RfAddress,
        #[arg(long)]
        mode: Mode,
        #[arg(long)]
        temperature: Option<f64>,
    },
    /// Set a manual temperature.
    Temp { rf_address: RfAddress, celsius: f64 },
    /// Apply a preset.
    Preset { rf_address: RfAddress, preset: Preset },
    /// Switch the HVAC mode.
    Hvac { rf_address: RfAddress, mode: HvacMode },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&PollerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = PollerConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if config.gateway.host.is_empty() {
        return Err("no gateway host configured (set [gateway] host or pass --host)".into());
    }

    let (rf_address, action) = match cli.command.unwrap_or(Command::Run) {
        Command::Run => return run(config).await,
        Command::Status { json } => {
            let gateway = actions::snapshot(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*gateway)?);
            } else {
                print!("{}", actions::render_status(&gateway));
            }
            return Ok(());
        }
        Command::Check => {
            let hello = actions::check(&config).await?;
            println!(
                "{} serial {} rf {} firmware {}",
                config.connector().info(),
                hello.serial,
                hello.rf_address,
                hello.firmware_version
            );
            return Ok(());
        }
        Command::Set { rf_address, mode, temperature } => {
            (rf_address, Action::Set { mode, temperature })
        }
        Command::Temp { rf_address, celsius } => (rf_address, Action::Temperature(celsius)),
        Command::Preset { rf_address, preset } => (rf_address, Action::Preset(preset)),
        Command::Hvac { rf_address, mode } => (rf_address, Action::Hvac(mode)),
    };

    let ack = actions::apply(&config, rf_address, action).await?;
    println!(
        "accepted; duty cycle {}%, {} free memory slots",
        ack.duty_cycle, ack.free_memory_slots
    );
    Ok(())
}

async fn run(config: PollerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("maxcube-poller v{}", env!("CARGO_PKG_VERSION"));
    info!("gateway: {}", config.connector().info());
    info!("poll interval: {:?}", config.poll_interval());

    let service = PollerService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await
}
