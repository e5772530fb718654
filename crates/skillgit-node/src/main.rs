//! skillgit node - serves skills to `git clone`.

use anyhow::Context;
use clap::Parser;
use skillgit_node::api::{create_router, AppState};
use skillgit_node::config::Config;
use skillgit_node::observability::{init_logging, LogFormat};
use skillgit_node::source::MemorySkillSource;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// skillgit node - git HTTP access to skills
#[derive(Parser, Debug)]
#[command(name = "skillgit-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// HTTP listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Directory with one subdirectory per skill
    #[arg(long)]
    skills_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Applies command line overrides on top of the file configuration.
    fn merge(self, mut config: Config) -> Config {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(dir) = self.skills_dir {
            config.skills_dir = dir;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let config = args.merge(config);

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting skillgit node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        skills_dir = %config.skills_dir.display(),
        use_file_timestamps = config.use_file_timestamps,
        "Node configuration"
    );

    let skills = MemorySkillSource::load_dir(&config.skills_dir, config.use_file_timestamps)
        .with_context(|| format!("failed to load skills from {}", config.skills_dir.display()))?;

    let app = create_router(AppState::new(Arc::new(skills)));
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("Node is ready. Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
