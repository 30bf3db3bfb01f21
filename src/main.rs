//! Thing Shadow - Rust implementation
//!
//! Runs the shadow engine over an in-memory registry seeded from the
//! configuration, prints every notification and offers a REPL to drive the
//! things by hand.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod cli;

use thing_shadow::config::ConfigWatcher;
use thing_shadow::paths::AppPaths;
use thing_shadow::registry::InMemoryRegistry;
use thing_shadow::shadow::{
    ShadowActor, ShadowEventKind, ShadowHandle, ShadowState, ShadowSubscriberFn,
};

/// Thing Shadow - aggregate thing states and coalesce their changes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to ./shadow.yaml, then the platform config dir)
    #[arg(short, long, env = "SHADOW_CONFIG")]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Also write daily rolling log files, in DIR or the default logs directory
    #[arg(long, value_name = "DIR", num_args = 0..=1)]
    log_dir: Option<Option<PathBuf>>,

    /// Apply a JSON state document at startup
    #[arg(long, value_name = "JSON")]
    apply: Option<String>,

    /// Print the full shadow and exit
    #[arg(long)]
    dump: bool,

    /// Do not start the interactive REPL
    #[arg(long)]
    no_repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect(args.config.as_deref());
    paths.ensure_directories()?;

    let log_dir = args
        .log_dir
        .as_ref()
        .map(|dir| dir.clone().unwrap_or_else(|| paths.logs_dir.clone()));
    let _log_guard = init_logging(&args.log_level, args.log_json, log_dir.as_deref())?;

    info!("Starting Thing Shadow v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(paths.config_str()).await?;

    let registry = Arc::new(
        InMemoryRegistry::from_config(&initial_config.things)
            .context("Failed to seed the thing registry")?,
    );
    info!(things = registry.len(), "Registry seeded from configuration");

    let shadow = ShadowActor::spawn(&initial_config.shadow, registry.clone())
        .context("Shadow feature unavailable")?;
    shadow.subscribe(notification_printer()).await?;

    if let Some(document) = &args.apply {
        let applied = shadow
            .apply_json(document.as_str())
            .await
            .context("Failed to apply state document")?;
        info!(applied, "State document applied");
    }

    if args.dump {
        shadow.flush().await?;
        let snapshot = shadow.snapshot().await?;
        println!("{}", serde_json::to_string_pretty(&snapshot.full_shadow)?);
        shadow.shutdown();
        return Ok(());
    }

    run_app(
        registry,
        shadow.clone(),
        config_watcher,
        !args.no_repl,
        shutdown_signal(),
    )
    .await?;

    // Deliver whatever is still pending before stopping
    shadow.flush().await?;
    shadow.shutdown();

    info!("Thing Shadow shutdown complete");
    Ok(())
}

async fn run_app(
    registry: Arc<InMemoryRegistry>,
    shadow: ShadowHandle,
    mut config_watcher: ConfigWatcher,
    interactive: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let (repl_tx, mut repl_rx) = mpsc::unbounded_channel();

    if interactive {
        // rustyline blocks, keep it off the runtime
        std::thread::spawn(move || {
            if let Err(e) = cli::read_commands(repl_tx) {
                warn!("REPL stopped: {}", e);
            }
        });
    } else {
        drop(repl_tx);
        info!("Running without REPL, press Ctrl+C to stop");
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(command) = repl_rx.recv() => {
                match cli::execute(command, &registry, &shadow).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("{} {:#}", "error:".red(), e),
                }
            }

            // Handle config reload
            Some(shadow_config) = config_watcher.next_shadow_config() => {
                info!("Configuration file changed, applying shadow settings");
                shadow.reconfigure(shadow_config);
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    Ok(())
}

/// Subscriber printing every notification to stdout
fn notification_printer() -> ShadowSubscriberFn {
    Arc::new(|kind: ShadowEventKind, state: &ShadowState| {
        let (label, body) = match kind {
            ShadowEventKind::ShadowChanged => (kind.to_string().green().bold(), &state.delta_shadow),
            ShadowEventKind::ShadowPublishing => (kind.to_string().blue().bold(), &state.full_shadow),
        };
        match serde_json::to_string(body) {
            Ok(json) => println!("{} {}", label, json),
            Err(e) => error!("Failed to render {} notification: {}", kind, e),
        }
    })
}

fn init_logging(level: &str, json: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "thing-shadow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
