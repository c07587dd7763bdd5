//! Surface Integrator
//!
//! Runs the pages and surfaces described by `CSI.ini` against an in-memory
//! host, ticking the current page on a fixed interval.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use surface_integrator::config::{AppConfig, IniConfig, ResourceWatcher};
use surface_integrator::host::MemoryHost;
use surface_integrator::io;
use surface_integrator::paths::{AppPaths, ResourceLayout};
use surface_integrator::session::{DeviceTransports, NoTransports, Session};

/// Surface Integrator - bind MIDI and OSC control surfaces to a host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (detected when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Compile the resource directory, print a summary and exit
    #[arg(long)]
    check: bool,

    /// With --check, print the summary as JSON
    #[arg(long, requires = "check")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.list_ports {
        return io::list_ports();
    }

    let config_path = args.config.clone().unwrap_or_else(|| AppPaths::detect().config);
    info!("Starting Surface Integrator...");
    info!("Configuration file: {}", config_path.display());

    let config = AppConfig::load_or_default(&config_path).await?;
    let layout = config.layout();
    info!("Resource directory: {}", layout.root().display());

    let mut host = config.host.build();

    if args.check {
        let ini = IniConfig::load(&layout.ini()).await?;
        let session = Session::build(&ini, &layout, config.console, &mut host, &mut NoTransports);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&summary_json(&session))?);
        } else {
            print_summary(&session);
        }
        return Ok(());
    }

    run_app(config, layout, host, shutdown_signal()).await?;

    info!("Surface Integrator shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    layout: ResourceLayout,
    mut host: MemoryHost,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let mut transports = DeviceTransports::new();
    let ini = IniConfig::load(&layout.ini()).await?;
    let mut session = Session::build(&ini, &layout, config.console, &mut host, &mut transports);

    let mut watcher = match ResourceWatcher::new(layout.root()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("⚠️  Hot reload disabled: {:#}", e);
            None
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("Ready, ticking every {} ms", config.tick_interval_ms);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick(&mut host);
            }

            Some(changed) = next_change(&mut watcher) => {
                info!("📝 {} resource file(s) changed, rebuilding session...", changed.len());
                match IniConfig::load(&layout.ini()).await {
                    Ok(ini) => {
                        session = Session::build(&ini, &layout, config.console, &mut host, &mut transports);
                        info!("✅ Session rebuilt");
                    }
                    Err(e) => warn!("⚠️  Failed to reload {} (keeping old session): {:#}", layout.ini().display(), e),
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping tick loop");
                break;
            }
        }
    }

    Ok(())
}

/// Pending forever when hot reload is off
async fn next_change(watcher: &mut Option<ResourceWatcher>) -> Option<Vec<PathBuf>> {
    match watcher {
        Some(watcher) => watcher.next_change().await,
        None => std::future::pending().await,
    }
}

fn print_summary(session: &Session) {
    println!("\n{}", "=== Session ===".bold().cyan());
    if session.pages().is_empty() {
        println!("  {}", "(no pages)".yellow());
    }
    for (i, page) in session.pages().iter().enumerate() {
        let marker = if i == session.current_index() { "*" } else { " " };
        println!("\n{} {} {}", marker, "Page".bold(), page.name().bright_white());
        for surface in page.surfaces() {
            let io = if surface.has_transport() {
                "I/O".green()
            } else {
                "no I/O".yellow()
            };
            println!(
                "    {} [{}] {} widgets, {} zones, {}",
                surface.name().bright_white(),
                io,
                surface.widget_count().to_string().green(),
                surface.zone_template_count().to_string().green(),
                surface.active_zone_names().join(", ").cyan()
            );
        }
    }
    println!();
}

fn summary_json(session: &Session) -> serde_json::Value {
    let pages: Vec<_> = session
        .pages()
        .iter()
        .map(|page| {
            let surfaces: Vec<_> = page
                .surfaces()
                .iter()
                .map(|surface| {
                    serde_json::json!({
                        "name": surface.name(),
                        "io": surface.has_transport(),
                        "widgets": surface.widget_count(),
                        "zones": surface.zone_template_count(),
                        "active_zones": surface.active_zone_names(),
                    })
                })
                .collect();
            serde_json::json!({ "name": page.name(), "surfaces": surfaces })
        })
        .collect();
    serde_json::json!({ "current_page": session.current_index(), "pages": pages })
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
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
