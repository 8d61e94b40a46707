//! Modular OCR engine abstraction.
//!
//! Defines the [`OcrEngine`] trait so different OCR backends (local Tesseract,
//! a PaddleOCR sidecar) can be selected at startup. The engine is built once
//! and shared read-only across requests.

pub mod paddle;
pub mod tesseract;

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::ingest::PageImage;

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize one page, returning its text lines in reading order.
    async fn recognize(&self, page: &PageImage) -> anyhow::Result<Vec<String>>;
}

/// Known engine identifiers used for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Tesseract,
    PaddleSidecar,
}

impl OcrProviderKind {
    /// Parse a configuration string into a provider kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tesseract" => Some(Self::Tesseract),
            "paddle_sidecar" | "paddle" => Some(Self::PaddleSidecar),
            _ => None,
        }
    }
}

/// Build the configured engine, checking that it is usable.
pub async fn build_engine(config: &ServiceConfig) -> anyhow::Result<Arc<dyn OcrEngine>> {
    match config.ocr_provider {
        OcrProviderKind::Tesseract => {
            let engine =
                tesseract::TesseractEngine::new(&config.tesseract_bin, &config.ocr_languages);
            engine.probe().await?;
            Ok(Arc::new(engine))
        }
        OcrProviderKind::PaddleSidecar => {
            let engine =
                paddle::PaddleSidecarEngine::new(reqwest::Client::new(), &config.paddle_ocr_url);
            Ok(Arc::new(engine))
        }
    }
}

/// Split engine output into lines, dropping blank ones.
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
