//! Watch command: follow progress events across all tasks.

use console::style;
use futures::StreamExt;

use crate::backends::Backends;
use crate::config::Config;
use crate::events::{EventBus, EventKind, CHANNEL_PATTERN};

pub async fn cmd_watch(config: &Config, batch: Option<&str>) -> anyhow::Result<()> {
    if config.broker.is_memory() {
        anyhow::bail!("watch needs a shared broker; set REDIS_URL or [broker] url");
    }
    let backends = Backends::connect(&config.broker).await?;
    let mut stream = backends.events.subscribe_all().await?;

    eprintln!(
        "{} Watching {} (Ctrl+C to stop)",
        style("→").cyan(),
        CHANNEL_PATTERN
    );

    loop {
        tokio::select! {
            next = stream.next() => {
                let Some(event) = next else {
                    break;
                };
                if batch.is_some() && event.batch_id.as_deref() != batch {
                    continue;
                }
                println!("{}", event.to_json()?);
                if batch.is_some() && event.event == EventKind::BatchCompleted {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
