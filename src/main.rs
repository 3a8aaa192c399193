//! provider-shield daemon.
//!
//! Loads a shield configuration, runs the recovery monitor against the
//! configured services and logs every event the shield publishes. Intended
//! as the composition root an application embeds or runs alongside.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use provider_shield::config::loader::load_config;
use provider_shield::config::watcher::{ConfigUpdate, ConfigWatcher};
use provider_shield::events::{handler_fn, kinds, Event};
use provider_shield::lifecycle::{Signal, SignalListener};
use provider_shield::observability::{logging, metrics};
use provider_shield::{ShieldConfig, ShieldContext};

#[derive(Parser)]
#[command(name = "provider-shield")]
#[command(about = "Rate limiting, circuit breaking and recovery for third-party providers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration when the file changes.
    #[arg(short, long)]
    watch: bool,

    /// Override the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn load(cli: &Cli) -> Result<ShieldConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    Ok(config)
}

fn reload(context: &ShieldContext, cli: &Cli) {
    let Some(path) = &cli.config else {
        tracing::warn!("Reload requested but no config file was given");
        return;
    };
    match load_config(path) {
        Ok(config) => {
            if let Err(e) = context.apply_config(&config) {
                tracing::error!(error = %e, "Failed to apply reloaded config");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to reload config, keeping current configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init_logging(&config.observability)?;
    tracing::info!("provider-shield v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let context = Arc::new(ShieldContext::from_config(&config)?);
    tracing::info!(
        services = config.services.len(),
        monitor_interval_secs = config.monitor.interval_secs,
        "Configuration loaded"
    );

    let log_event = handler_fn(|event: Arc<Event>| async move {
        tracing::info!(
            event = %event.kind,
            source = %event.source,
            data = %event.data,
            "Shield event"
        );
        Ok(())
    });
    for kind in kinds::ALL {
        context.events().on(*kind, log_event.clone());
    }

    context.spawn_monitor();

    // Keep the notify watcher alive for the lifetime of the process.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let ctx = context.clone();
            let mut shutdown = context.subscribe_shutdown();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => match update {
                            Some(ConfigUpdate::Loaded(config)) => {
                                if let Err(e) = ctx.apply_config(&config) {
                                    tracing::error!(error = %e, "Failed to apply reloaded config");
                                }
                            }
                            Some(ConfigUpdate::Rejected(e)) => tracing::error!(
                                error = %e,
                                "Config change rejected, keeping current configuration"
                            ),
                            None => break,
                        },
                        _ = shutdown.recv() => break,
                    }
                }
            });
            Some(watcher)
        }
        _ => None,
    };

    let mut signals = SignalListener::new()?;
    loop {
        match signals.recv().await? {
            Signal::Shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            Signal::Reload => {
                tracing::info!("Reload signal received");
                reload(&context, &cli);
            }
        }
    }

    context.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
