//! Local Tesseract engine (runs the `tesseract` CLI).

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use super::{split_lines, OcrEngine};
use crate::ingest::PageImage;

pub struct TesseractEngine {
    binary: String,
    languages: String,
}

impl TesseractEngine {
    pub fn new(binary: &str, languages: &str) -> Self {
        Self {
            binary: binary.to_string(),
            languages: languages.to_string(),
        }
    }

    /// Check that the binary runs. Called once at startup.
    pub async fn probe(&self) -> anyhow::Result<()> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("cannot run {} (is tesseract-ocr installed?)", self.binary))?;
        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.binary, output.status);
        }

        // Older releases print the version banner on stderr.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };
        info!(
            "TesseractEngine: {} (languages={})",
            banner.lines().next().unwrap_or("unknown version"),
            self.languages
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, page: &PageImage) -> anyhow::Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .arg(&page.path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .output()
            .await
            .with_context(|| format!("cannot run {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let lines = split_lines(&text);
        debug!("TesseractEngine: page {} -> {} lines", page.index, lines.len());
        Ok(lines)
    }
}
