use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use perf_orchestrator::commands;
use perf_orchestrator::config::{CliArgs, ClientConfig};
use perf_orchestrator::error::PerfError;
use perf_orchestrator::store::{FileStore, MemoryStore, SharedStore};
use perf_orchestrator::testing::PerfTesting;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(args.log_file.as_deref())?;

    info!("Starting perf-orchestrator v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", args.backend_url);

    let config = ClientConfig::from_args(&args)?;
    let store: SharedStore = match &config.store_path {
        Some(path) => {
            info!("Session store: {:?}", path);
            Arc::new(FileStore::open(path))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let testing = PerfTesting::new(config, store)?;
    if let Err(e) = commands::run(&testing, args.command).await {
        error!("{:#}", e);
        if let Some(perf) = e.downcast_ref::<PerfError>() {
            println!("{}", perf.to_json());
        }
        return Err(e);
    }
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("perf_orchestrator=info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {:?}", path))?;
    std::fs::create_dir_all(dir)?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}
