//! Submit command.

use std::path::PathBuf;
use std::time::Duration;

use console::style;
use futures::StreamExt;

use super::worker::{build_orchestrator, build_pool};
use crate::backends::Backends;
use crate::config::Config;
use crate::events::EventBus;
use crate::pipeline::submit_documents;
use crate::region::Template;

/// How long to wait for trailing events once the queues are idle.
const EVENT_GRACE: Duration = Duration::from_millis(100);

pub async fn cmd_submit(
    config: &Config,
    files: &[PathBuf],
    template: Template,
    wait: bool,
) -> anyhow::Result<()> {
    let backends = Backends::connect(&config.broker).await?;
    if config.broker.is_memory() && !wait {
        anyhow::bail!("Broker is 'memory': jobs would be lost on exit. Use --wait or set REDIS_URL.");
    }

    let mut events = if wait {
        Some(backends.events.subscribe_all().await?)
    } else {
        None
    };

    let submission = submit_documents(&backends, files, template).await?;
    for path in &submission.rejected {
        eprintln!(
            "  {} Skipped {} (not a PDF or image)",
            style("!").yellow(),
            path.display()
        );
    }
    for job in &submission.jobs {
        eprintln!("{} {} → task {}", style("✓").green(), job.filename, job.task_id);
    }
    if let Some(batch_id) = &submission.batch_id {
        eprintln!(
            "{} Batch {} ({} documents)",
            style("→").cyan(),
            batch_id,
            submission.jobs.len()
        );
    }

    let Some(stream) = events.as_mut() else {
        return Ok(());
    };

    let orchestrator = build_orchestrator(config, &backends)?;
    build_pool(config, &backends, orchestrator, &[])
        .run_until_idle()
        .await?;

    while let Ok(Some(event)) = tokio::time::timeout(EVENT_GRACE, stream.next()).await {
        println!("{}", event.to_json()?);
    }
    Ok(())
}
