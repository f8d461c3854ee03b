//! Lootguard host
//!
//! Boots an in-process game host with the packet libraries named in
//! `LOOTGUARD_HOST_LIBS`, enables item protection on it and reads plugin
//! commands from the console until shut down.

use std::env;
use std::io::BufRead;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lootguard::config::GuardConfig;
use lootguard::game::{CommandDispatcher, CommandSender};
use lootguard::host::HostServices;
use lootguard::state::GuardContext;
use lootguard::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first, it decides the log level
    let config = GuardConfig::load().await?;
    init_logging(config.log_filter());

    info!("Lootguard v{} starting", VERSION);
    info!("Configuration loaded from: {}", config.config_path.display());

    // Boot the host and its optional packet libraries
    let host = HostServices::new();
    let libraries = env::var("LOOTGUARD_HOST_LIBS").unwrap_or_default();
    host.install_libraries(libraries.split(','));
    if host.plugins.names().is_empty() {
        warn!("No host packet library installed (set LOOTGUARD_HOST_LIBS=packetfilter,packetwire)");
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let ctx = GuardContext::new(host, config);
    let janitors = ctx.spawn_janitors(&shutdown_tx);

    let commands = CommandDispatcher::new(ctx.clone());
    let console = tokio::spawn(run_console(commands, shutdown_tx.clone()));

    info!("Lootguard ready, type 'help' for commands or 'stop' to exit");

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx).await;

    for handle in janitors {
        if let Err(e) = handle.await {
            error!("Janitor task failed: {}", e);
        }
    }
    console.abort();
    shutdown(&ctx);

    info!("Lootguard shutdown complete");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

/// Read console lines and dispatch them as console commands
async fn run_console(commands: CommandDispatcher, shutdown_tx: broadcast::Sender<()>) {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    let mut shutdown_rx = shutdown_tx.subscribe();

    // Stdin blocks, so it is read on a detached thread that never holds up
    // runtime shutdown
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else {
                    info!("Console closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("stop") {
                    info!("Stop requested from console");
                    let _ = shutdown_tx.send(());
                    break;
                }
                commands.dispatch(&CommandSender::Console, line).await;
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C, SIGTERM or console stop)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let mut stop_rx = shutdown_tx.subscribe();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
        _ = stop_rx.recv() => {
            return;
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}

fn shutdown(ctx: &Arc<GuardContext>) {
    ctx.shutdown();
    let status = ctx.status();
    info!(
        protected = status.registry.protected_items,
        suppressed = status.decisions.suppressed,
        "Final protection counters"
    );
}
