//! Worker command.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::sync::watch;

use crate::backends::Backends;
use crate::capabilities::{
    Capabilities, HttpDetector, OpenAiExtractor, OpenAiStructurer, OpenAiValidator, Structurer,
    TextExtractor, Validator,
};
use crate::config::Config;
use crate::pipeline::maintenance::{run_periodic_cleanup, sweep_interim};
use crate::pipeline::Orchestrator;
use crate::work_queue::{QueueName, WorkerPool};

/// Orchestrator wired to the configured detector and model endpoints.
pub(super) fn build_orchestrator(
    config: &Config,
    backends: &Backends,
) -> anyhow::Result<Arc<Orchestrator>> {
    let detector = Arc::new(HttpDetector::from_config(&config.detector)?);
    let extractor: Arc<dyn TextExtractor> = Arc::new(OpenAiExtractor::from_config(&config.llm)?);
    let structurer: Arc<dyn Structurer> = Arc::new(OpenAiStructurer::from_config(&config.llm)?);
    let validator: Arc<dyn Validator> = Arc::new(OpenAiValidator::from_config(&config.llm)?);

    Ok(Arc::new(Orchestrator::new(
        Capabilities::with_detector(detector, extractor),
        structurer,
        validator,
        backends,
        config,
    )))
}

pub(super) fn build_pool(
    config: &Config,
    backends: &Backends,
    orchestrator: Arc<Orchestrator>,
    queues: &[QueueName],
) -> WorkerPool<Orchestrator> {
    let pool = WorkerPool::new(backends.queue.clone(), orchestrator)
        .with_concurrency(QueueName::Gpu, config.pipeline.gpu_concurrency)
        .with_concurrency(QueueName::Llm, config.pipeline.llm_concurrency);
    if queues.is_empty() {
        pool
    } else {
        pool.only(queues)
    }
}

/// Consume stage messages until Ctrl+C, or until idle with `drain`.
pub async fn cmd_worker(config: &Config, queues: &[QueueName], drain: bool) -> anyhow::Result<()> {
    let backends = Backends::connect(&config.broker).await?;
    if config.broker.is_memory() && !drain {
        eprintln!(
            "{} Broker is 'memory': this worker only sees jobs submitted by this process",
            style("!").yellow()
        );
    }

    let orchestrator = build_orchestrator(config, &backends)?;
    let pool = build_pool(config, &backends, orchestrator, queues);
    let interim_root = config.pipeline.interim_dir();
    let ttl = Duration::from_secs(config.pipeline.interim_ttl_hours * 3600);

    eprintln!(
        "{} Worker started (gpu: {}, llm: {})",
        style("→").cyan(),
        pool.concurrency(QueueName::Gpu),
        pool.concurrency(QueueName::Llm)
    );

    if drain {
        pool.run_until_idle().await?;
        let removed = sweep_interim(&interim_root, ttl).await?;
        eprintln!(
            "{} Queues drained ({} stale interim directories removed)",
            style("✓").green(),
            removed
        );
        return Ok(());
    }

    eprintln!("  Press Ctrl+C to stop");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = tokio::spawn(run_periodic_cleanup(
        interim_root,
        ttl,
        Duration::from_secs(config.pipeline.cleanup_interval_secs.max(1)),
        shutdown_rx.clone(),
    ));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    pool.run(shutdown_rx).await?;
    let _ = cleanup.await;
    eprintln!("{} Worker stopped", style("✓").green());
    Ok(())
}
