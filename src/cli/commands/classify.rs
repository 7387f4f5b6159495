//! Classify command: inspect the crop chosen for one page.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;

use crate::capabilities::{Capabilities, HttpDetector, OpenAiExtractor};
use crate::config::Config;
use crate::region::{Classification, RegionClassifier, Template};

pub async fn cmd_classify(
    config: &Config,
    image: &Path,
    template: Template,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let detector = Arc::new(HttpDetector::from_config(&config.detector)?);
    let extractor = Arc::new(OpenAiExtractor::from_config(&config.llm)?);
    let classifier = RegionClassifier::new(
        Capabilities::with_detector(detector, extractor),
        config.region.clone(),
    );

    match classifier.classify_path(image, template).await {
        Classification::Extract(decision) => {
            let out = output.unwrap_or_else(|| default_output(image, decision.prompt_keyword()));
            decision.image.save(&out)?;
            println!(
                "{} {} ({}x{}) → {}",
                style("✓").green(),
                decision.prompt_keyword(),
                decision.image.width(),
                decision.image.height(),
                out.display()
            );
        }
        Classification::Skip(reason) => {
            println!("{} Skipped: {}", style("!").yellow(), reason);
        }
    }
    Ok(())
}

/// `<dir>/<stem>_<keyword>.png` next to the input.
fn default_output(image: &Path, keyword: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let name = format!("{}_{}.png", stem, keyword.replace(' ', "_"));
    image.with_file_name(name)
}
