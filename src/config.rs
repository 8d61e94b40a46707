//! Service configuration.
//!
//! Read from environment variables (a `.env` file is loaded first by `main`).
//! Every variable is optional; unset ones fall back to the defaults below.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ocr::OcrProviderKind;

const MIN_PDF_DPI: u32 = 72;
const MAX_PDF_DPI: u32 = 600;

/// Runtime configuration for the scanning service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub ocr_provider: OcrProviderKind,
    /// Tesseract language spec, e.g. `por+eng`.
    pub ocr_languages: String,
    pub tesseract_bin: String,
    pub pdftoppm_bin: String,
    pub paddle_ocr_url: String,
    pub pdf_dpi: u32,
    /// Root for per-request scratch directories. `None` uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            ocr_provider: OcrProviderKind::Tesseract,
            ocr_languages: "por+eng".to_string(),
            tesseract_bin: "tesseract".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            paddle_ocr_url: "http://localhost:8866".to_string(),
            pdf_dpi: 200,
            scratch_dir: None,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr
                .trim()
                .parse()
                .with_context(|| format!("Invalid BIND_ADDR: {}", addr))?;
        }

        if let Some(provider) = get("OCR_PROVIDER") {
            config.ocr_provider = OcrProviderKind::from_str(provider.trim())
                .with_context(|| {
                    format!(
                        "Unknown OCR_PROVIDER: {} (expected tesseract or paddle_sidecar)",
                        provider
                    )
                })?;
        }

        if let Some(langs) = get("OCR_LANGUAGES") {
            config.ocr_languages = langs.trim().to_string();
        }
        if let Some(bin) = get("TESSERACT_BIN") {
            config.tesseract_bin = bin;
        }
        if let Some(bin) = get("PDFTOPPM_BIN") {
            config.pdftoppm_bin = bin;
        }
        if let Some(url) = get("PADDLE_OCR_URL") {
            config.paddle_ocr_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(dpi) = get("PDF_DPI") {
            let dpi: u32 = dpi
                .trim()
                .parse()
                .with_context(|| format!("Invalid PDF_DPI: {}", dpi))?;
            if !(MIN_PDF_DPI..=MAX_PDF_DPI).contains(&dpi) {
                anyhow::bail!(
                    "PDF_DPI must be between {} and {}, got {}",
                    MIN_PDF_DPI,
                    MAX_PDF_DPI,
                    dpi
                );
            }
            config.pdf_dpi = dpi;
        }

        if let Some(dir) = get("SCRATCH_DIR") {
            config.scratch_dir = Some(PathBuf::from(dir));
        }

        if let Some(max) = get("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = max
                .trim()
                .parse()
                .with_context(|| format!("Invalid MAX_UPLOAD_BYTES: {}", max))?;
        }

        Ok(config)
    }
}
