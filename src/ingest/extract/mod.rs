
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Extract plain text from an uploaded document file, dispatching on the
/// filename suffix. Unrecognized formats are read as plain text.
#[inline]
pub fn extract_text(file_path: &Path, filename: &str) -> Result<String> {
    if has_pdf_suffix(filename) {
        debug!("Extracting PDF text from {}", file_path.display());
        pdf_extract::extract_text(file_path).map_err(|e| {
            anyhow::anyhow!("Failed to extract PDF text from {}: {}", file_path.display(), e)
        })
    } else {
        debug!("Reading plain text from {}", file_path.display());
        fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read document file {}", file_path.display()))
    }
}

fn has_pdf_suffix(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}
