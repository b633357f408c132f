//! Prerender CLI
//!
//! Renders URLs through the worker pool and prints one JSON line per result.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prerender::{RenderConfig, RenderCoordinator, RenderRequest, WorkerFactory};

/// Render pages with a server-side rendering bundle
#[derive(Parser, Debug)]
#[command(name = "prerender")]
#[command(about = "Render pages through a pool of script interpreters", long_about = None)]
struct Args {
    /// URLs to render
    #[arg(required = true)]
    urls: Vec<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rendering bundle (overrides config)
    #[arg(short, long)]
    bundle: Option<PathBuf>,

    /// Number of prewarmed workers (overrides config)
    #[arg(long)]
    pool_size: Option<usize>,

    /// Build a fresh worker for every request
    #[arg(long)]
    debug: bool,

    /// Render deadline in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Heap cap per interpreter in MiB (overrides config)
    #[arg(long)]
    memory_limit_mb: Option<usize>,

    /// Render every URL this many times
    #[arg(long, default_value = "1")]
    repeat: usize,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut RenderConfig) {
        if let Some(bundle) = &self.bundle {
            config.bundle_path = bundle.clone();
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(ms) = self.timeout_ms {
            config.render_timeout_ms = ms;
        }
        if let Some(mb) = self.memory_limit_mb {
            config.memory_limit_mb = Some(mb);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prerender=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            args.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!args.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let mut config = RenderConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        bundle = %config.bundle_path.display(),
        pool_size = config.pool_size,
        debug = config.debug,
        timeout_ms = config.render_timeout_ms,
        "Starting prerender v{}",
        env!("CARGO_PKG_VERSION")
    );

    let factory = WorkerFactory::quickjs(&config);
    let coordinator = RenderCoordinator::from_config(&config, factory)
        .await
        .context("failed to build render pool")?;

    let renders = (0..args.repeat).flat_map(|_| args.urls.iter()).map(|url| {
        let coordinator = coordinator.clone();
        let request = RenderRequest::new(url.clone());
        async move { coordinator.handle(request).await }
    });
    let renders: Vec<_> = renders.map(tokio::spawn).collect();

    let mut failures = 0usize;
    for render in join_all(renders).await {
        let result = render.context("render task failed")??;
        if !result.is_success() {
            failures += 1;
        }
        let line = serde_json::json!({
            "duration_ms": result.render_duration.as_millis() as u64,
            "result": result,
        });
        println!("{line}");
    }

    let status = coordinator.pool().status();
    info!(
        failures,
        created = status.created_total,
        disposed = status.disposed_total,
        "Finished: {}",
        serde_json::to_string(&status)?
    );
    Ok(())
}
