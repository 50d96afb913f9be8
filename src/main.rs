//! Texnouz Roaming: availability daemon
//!
//! Hosts a roaming network's resource tree and reservation store, runs
//! the periodic reservation sweep and logs every lifecycle event until
//! SIGINT/SIGTERM.
//!
//! ```sh
//! # Run with default config (~/.config/texnouz-roaming/config.toml)
//! roaming-availability
//!
//! # Custom config path
//! roaming-availability --config /etc/texnouz-roaming/config.toml
//!
//! # Validate config without starting
//! roaming-availability --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error, info};

use texnouz_roaming::config::{AppConfig, LogFormat};
use texnouz_roaming::shared::ShutdownCoordinator;
use texnouz_roaming::{default_config_path, RoamingNetwork};

#[derive(Parser, Debug)]
#[command(
    name = "roaming-availability",
    version,
    about = "Availability tracking and reservation engine for EV charging roaming",
    long_about = "Texnouz Roaming: status aggregation and reservation lifecycle \
                  for operators, pools, stations and charge points.\n\n\
                  Default config: ~/.config/texnouz-roaming/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "ROAMING_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Roaming network id.
    #[arg(long, default_value = "texnouz")]
    network_id: String,

    /// Human-readable roaming network name.
    #[arg(long, default_value = "Texnouz Roaming")]
    network_label: String,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,
}

fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let (mut config, load_error) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config);
    match &load_error {
        None => info!("Configuration loaded from {}", config_path.display()),
        Some(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
        }
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        if let Some(e) = load_error {
            return Err(e.into());
        }
        println!("✅ Configuration is valid");
        println!("   Config file     : {}", config_path.display());
        println!("   Log level       : {}", config.logging.level);
        println!("   History size    : {}", config.status.history_size);
        println!("   Tie-break       : {:?}", config.aggregation.tie_break());
        println!("   Default duration: {}s", config.reservations.default_duration_secs);
        println!("   Grace period    : {}s", config.reservations.grace_period_secs);
        println!("   Sweep interval  : {}s", config.reservations.sweep_interval_secs);
        println!("   Retention       : {}s", config.reservations.retention_secs);
        return Ok(());
    }

    // ── Build network ──────────────────────────────────────────
    let network = RoamingNetwork::from_config(cli.network_id, cli.network_label, &config);
    info!(
        network_id = %network.id(),
        label = %network.label(),
        "🚀 Starting Texnouz Roaming availability engine"
    );

    let coordinator = ShutdownCoordinator::default();
    coordinator.start_signal_listener();

    let sweep = network.start_sweep_task(coordinator.signal(), config.reservations.sweep_interval());

    // ── Event log ──────────────────────────────────────────────
    let mut events = network.event_bus().subscribe();
    let shutdown = coordinator.signal();
    let event_log = tokio::spawn(async move {
        loop {
            tokio::select! {
                message = events.recv() => match message {
                    Some(message) => debug!(
                        event_id = %message.id,
                        event_type = message.event.event_type(),
                        resource_id = %message.event.resource_id(),
                        "Event"
                    ),
                    None => break,
                },
                _ = shutdown.notified().wait() => break,
            }
        }
    });

    info!("Press Ctrl+C to shutdown gracefully.");

    coordinator
        .shutdown_with_cleanup(move || async move {
            let _ = sweep.await;
            let _ = event_log.await;
            let report = network.status_report(None);
            info!(report = %report, "Final status report");
            match report.render().to_json() {
                Ok(body) => debug!(body = %body, "Final status report body"),
                Err(e) => error!("Failed to render status report: {}", e),
            }
        })
        .await;

    Ok(())
}
