//! Small component graph driven through init and a list of stages.
//!
//! ```text
//! stagehand-demo                      # init, start, stop
//! stagehand-demo health stop          # run the named stages in order
//! stagehand-demo --fail-stage start   # one component fails `start`
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use thiserror::Error;

use stagehand::{
    BoxError, CancellationToken, Container, ContainerError, ContainerOptions, Setup,
    StageContext, init_logging,
};

#[derive(Parser)]
#[command(name = "stagehand-demo")]
#[command(about = "Run a demo component graph through its stages", long_about = None)]
#[command(version)]
struct Cli {
    /// Stages to run after init, in order
    #[arg(default_values = ["start", "stop"])]
    stages: Vec<String>,

    /// Make the store fail when this stage runs
    #[arg(long)]
    fail_stage: Option<String>,

    /// JSON file with container options
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Debug, Clone)]
struct AppConfig {
    listen: String,
    tick: Duration,
}

#[derive(Debug, Error)]
#[error("store unavailable during stage `{0}`")]
struct StoreUnavailable(String);

#[derive(Debug, Default)]
struct Store {
    records: Mutex<Vec<String>>,
}

impl Store {
    fn append(&self, record: impl Into<String>) {
        self.records.lock().push(record.into());
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}

#[derive(Debug)]
struct Server {
    config: AppConfig,
    store: Arc<Store>,
}

impl Server {
    /// Tick until the stage scope is cancelled or a few ticks have passed.
    async fn serve(&self, ctx: StageContext) -> Result<(), BoxError> {
        for tick in 0..3 {
            tokio::select! {
                _ = tokio::time::sleep(self.config.tick) => {
                    self.store.append(format!("tick {}", tick));
                }
                _ = ctx.cancelled() => return Err(ctx.cancellation_error()),
            }
        }
        tracing::info!(listen = %self.config.listen, records = self.store.len(), "Server served");
        Ok(())
    }
}

fn build(options: ContainerOptions, fail_stage: Option<String>) -> Result<Container> {
    let container = Container::with_options(options)?;

    container.register(Setup::<AppConfig>::new().init(|_| AppConfig {
        listen: "127.0.0.1:8080".to_string(),
        tick: Duration::from_millis(50),
    }))?;

    let mut store = Setup::<Arc<Store>>::new().init(|_| Arc::new(Store::default()));
    if let Some(stage) = fail_stage {
        let name = stage.clone();
        store = store.stage(stage, move |_ctx, _store| {
            let name = name.clone();
            async move { Err::<(), BoxError>(StoreUnavailable(name).into()) }
        });
    }
    container.register(store)?;

    container.register(
        Setup::<Arc<Server>>::new()
            .name("public")
            .try_init(|c| {
                Ok(Arc::new(Server {
                    config: c.get::<AppConfig>()?,
                    store: c.get::<Arc<Store>>()?,
                }))
            })
            .stage("start", |ctx, server| async move { server.serve(ctx).await })
            .stage("health", |_ctx, server| async move {
                tracing::info!(records = server.store.len(), "Server healthy");
                Ok::<(), BoxError>(())
            })
            .stage("stop", |_ctx, server| async move {
                tracing::info!(listen = %server.config.listen, "Server stopped");
                Ok::<(), BoxError>(())
            }),
    )?;

    Ok(container)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log)?;

    let options = match &cli.config {
        Some(path) => ContainerOptions::from_json_file(path)?,
        None => ContainerOptions::default(),
    };

    let container = build(options, cli.fail_stage)?;
    let metrics = container.init().context("container init failed")?;
    println!(
        "initialized {} components in {}ms",
        metrics.components.len(),
        metrics.total_duration_ms
    );

    let cancel = CancellationToken::new();
    for stage in &cli.stages {
        match container.exec_stage(&cancel, stage).await {
            Ok(metrics) => {
                println!(
                    "stage {}: {} task(s) in {}ms",
                    stage,
                    metrics.tasks.len(),
                    metrics.duration_ms
                );
            }
            Err(ContainerError::StageExecutionFailed(errors)) => {
                eprintln!("stage {}: {} failure(s)", stage, errors.len());
                for failure in errors.failures() {
                    eprintln!("  {}: {}", failure.coordinate(), failure.inner());
                }
                if errors.contains::<StoreUnavailable>() {
                    eprintln!("  caused by a store outage");
                }
                anyhow::bail!("stage {} failed", stage);
            }
            Err(err) => return Err(err).with_context(|| format!("stage {} failed", stage)),
        }
    }

    Ok(())
}
