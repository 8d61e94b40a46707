//! PaddleOCR sidecar engine.
//!
//! The sidecar is a small HTTP service wrapping PaddleOCR. It takes one page
//! image as base64 JSON and answers with the recognized lines.

use anyhow::Context;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OcrEngine;
use crate::ingest::PageImage;

#[derive(Serialize)]
struct OcrRequest<'a> {
    image_base64: String,
    filename: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    lines: Vec<String>,
}

pub struct PaddleSidecarEngine {
    url: String,
    client: reqwest::Client,
}

impl PaddleSidecarEngine {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/ocr", self.url)
    }
}

#[async_trait::async_trait]
impl OcrEngine for PaddleSidecarEngine {
    fn name(&self) -> &str {
        "paddle_sidecar"
    }

    async fn recognize(&self, page: &PageImage) -> anyhow::Result<Vec<String>> {
        let data = tokio::fs::read(&page.path)
            .await
            .with_context(|| format!("cannot read page image {}", page.path.display()))?;

        let filename = page
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("page");
        let body = OcrRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode(&data),
            filename,
            mime_type: page.kind.mime(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .context("PaddleOCR sidecar unreachable")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("PaddleOCR sidecar error ({}): {}", status, error_text);
        }

        let ocr: OcrResponse = response.json().await?;
        let lines: Vec<String> = ocr
            .lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect();
        debug!("PaddleSidecarEngine: page {} -> {} lines", page.index, lines.len());
        Ok(lines)
    }
}
