//! time-limiter: an HTTP filter pipeline host with per-URL request deadlines.
//!
//! ```text
//! time-limiter serve --config limiter.toml --watch
//! time-limiter check --config limiter.toml
//! time-limiter kinds
//! time-limiter default-spec TimeLimiter
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use time_limiter::config::load_config;
use time_limiter::config::watcher::ConfigWatcher;
use time_limiter::http::HttpServer;
use time_limiter::lifecycle::{wait_for_signal, Shutdown};
use time_limiter::observability::{logging, metrics};
use time_limiter::pipeline::FilterRegistry;

#[derive(Parser)]
#[command(name = "time-limiter")]
#[command(about = "HTTP filter pipeline with per-URL request time limits", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve traffic through the configured pipeline
    Serve {
        #[arg(short, long)]
        config: PathBuf,

        /// Reload the pipeline when the config file changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Validate a config file without serving
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the registered filter kinds
    Kinds,
    /// Print a filter config skeleton for a kind
    DefaultSpec { kind: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let registry = FilterRegistry::with_builtin();

    match cli.command {
        Commands::Serve { config, watch } => serve(&config, watch, registry).await?,
        Commands::Check { config } => {
            let loaded = load_config(&config, &registry)?;
            println!(
                "{}: ok (pipeline {:?}, {} filters)",
                config.display(),
                loaded.pipeline.name,
                loaded.pipeline.filters.len()
            );
        }
        Commands::Kinds => {
            for info in registry.kinds() {
                println!("{:<12} {}", info.kind, info.description);
                println!("{:<12} results: {:?}", "", info.results);
            }
        }
        Commands::DefaultSpec { kind } => {
            let spec = registry
                .default_spec(&kind)
                .ok_or_else(|| format!("unknown filter kind {:?}", kind))?;
            let mut filter = toml::Table::new();
            filter.insert("name".into(), kind.to_lowercase().into());
            filter.insert("kind".into(), kind.into());
            filter.extend(spec);

            let mut pipeline = toml::Table::new();
            pipeline.insert("filters".into(), toml::Value::Array(vec![filter.into()]));
            let mut document = toml::Table::new();
            document.insert("pipeline".into(), pipeline.into());
            print!("{}", toml::to_string_pretty(&document)?);
        }
    }

    Ok(())
}

async fn serve(
    path: &Path,
    watch: bool,
    registry: FilterRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path, &registry)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        config = %path.display(),
        bind_address = %config.listener.bind_address,
        pipeline = %config.pipeline.name,
        strict_validation = config.pipeline.strict_validation,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let (config_updates, _watcher) = if watch {
        let (watcher, updates) = ConfigWatcher::new(path, Arc::new(registry.clone()));
        (updates, Some(watcher.run()?))
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (updates, None)
    };

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                signal_shutdown.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for signals"),
        }
    });

    let server = HttpServer::new(config, registry)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
