//! Page rendering for submitted documents.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use super::StageError;

const PDFTOPPM_NOT_FOUND: &str =
    "pdftoppm not found. Install poppler-utils (apt install poppler-utils / brew install poppler)";

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_image(path: &Path) -> bool {
    extension(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_pdf(path: &Path) -> bool {
    extension(path).is_some_and(|e| e == "pdf")
}

/// Documents the pipeline accepts.
pub fn is_supported(path: &Path) -> bool {
    is_pdf(path) || is_image(path)
}

/// Directory holding a document's rendered pages: `<task_dir>/<stem>_images`.
pub fn pages_dir(task_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    task_dir.join(format!("{}_images", stem))
}

/// Render every page of `source` into `output_dir`, returning page images
/// in page order. An image input is copied and counts as one page.
pub async fn render_pages(source: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, StageError> {
    tokio::fs::create_dir_all(output_dir).await?;

    if is_image(source) {
        let name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("page-1.png"));
        let target = output_dir.join(name);
        tokio::fs::copy(source, &target).await?;
        return Ok(vec![target]);
    }
    if !is_pdf(source) {
        return Err(StageError::Unsupported(source.display().to_string()));
    }

    which::which("pdftoppm").map_err(|_| StageError::Render(PDFTOPPM_NOT_FOUND.to_string()))?;

    let prefix = output_dir.join("page");
    let output = Command::new("pdftoppm")
        .args(["-png", "-r", "300"])
        .arg(source)
        .arg(&prefix)
        .output()
        .await?;
    if !output.status.success() {
        return Err(StageError::Render(format!(
            "pdftoppm failed to convert {}: {}",
            source.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let pages = collect_pages(output_dir).await?;
    debug!("Rendered {} pages from {}", pages.len(), source.display());
    Ok(pages)
}

/// Page number from a pdftoppm output name. Padding width depends on the
/// page count (`page-1.png`, `page-01.png`, `page-001.png`).
fn page_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix("page-")?.strip_suffix(".png")?;
    rest.parse().ok()
}

async fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>, StageError> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(n) = page_number(&path) {
            pages.push((n, path));
        }
    }
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}
