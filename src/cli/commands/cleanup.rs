//! Cleanup command.

use std::time::Duration;

use console::style;

use crate::config::Config;
use crate::pipeline::maintenance::sweep_interim;

pub async fn cmd_cleanup(config: &Config, ttl_hours: Option<u64>) -> anyhow::Result<()> {
    let root = config.pipeline.interim_dir();
    let hours = ttl_hours.unwrap_or(config.pipeline.interim_ttl_hours);
    let removed = sweep_interim(&root, Duration::from_secs(hours * 3600)).await?;
    println!(
        "{} Removed {} interim directories older than {}h from {}",
        style("✓").green(),
        removed,
        hours,
        root.display()
    );
    Ok(())
}
