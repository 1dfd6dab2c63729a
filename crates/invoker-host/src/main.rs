use std::sync::Arc;

use clap::Parser;
use invoker_core::{EngineConfig, Runtime, StaticRuntime};
use invoker_dispatch::{Dispatcher, Environment};
use invoker_jobs::{JobCatalog, JobScheduler};
use invoker_plugins::{PluginEntry, PluginRegistry};
use tracing::{info, warn};

mod jobs;

/// Invocation engine host: request pool plus background jobs.
#[derive(Parser, Debug)]
#[command(name = "invokerd")]
#[command(about = "Runs the invocation pools and the background job scheduler")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Run the start-up pass, print the scheduler status as JSON and exit
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoker=info".into()),
        )
        .init();

    // load config: --config > INVOKER_CONFIG env > ~/.invoker/invoker.toml
    let config_path = args.config.or_else(|| std::env::var("INVOKER_CONFIG").ok());
    let config = EngineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        EngineConfig::default()
    });
    info!(mode = %config.mode, pool_size = config.pool_size(), jobs_pool = config.jobs_pool_size(), "configuration loaded");

    let runtime = Arc::new(StaticRuntime::new(config.mode));
    runtime.start()?;

    let plugins = Arc::new(PluginRegistry::new());
    plugins.register(PluginEntry::new(Arc::new(jobs::InvocationLog)).with_priority(100));

    let env = Environment::new(runtime, plugins);
    let invocations = Dispatcher::new("invocations", config.pool_size(), env.clone());
    let scheduler = Arc::new(JobScheduler::new(&config, env));

    let mut catalog = JobCatalog::new();
    jobs::register(
        &mut catalog,
        &config,
        Arc::downgrade(&scheduler),
        invocations.clone(),
    );

    scheduler.start(&catalog).await?;

    if args.status {
        println!("{}", serde_json::to_string_pretty(&scheduler.snapshot())?);
    } else {
        info!("invokerd running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        info!("shutdown requested");
    }

    invocations.shutdown();
    scheduler.stop(&catalog).await?;
    Ok(())
}
