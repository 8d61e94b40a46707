//! Per-request scan pipeline: scratch → ingest → OCR each page → joined text.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument};

use crate::error::ScanError;
use crate::ingest::{Ingestor, RawDocument};
use crate::ocr::OcrEngine;
use crate::scratch::ScratchDir;

/// Separator between the text of consecutive pages.
const PAGE_SEPARATOR: &str = "\n\n";

/// Text recognized from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutput {
    pub text: String,
    pub pages: usize,
}

/// Pipeline orchestrator. Holds no per-request state.
pub struct Scanner {
    ingestor: Ingestor,
    engine: Arc<dyn OcrEngine>,
    scratch_root: Option<PathBuf>,
}

impl Scanner {
    pub fn new(ingestor: Ingestor, engine: Arc<dyn OcrEngine>, scratch_root: Option<PathBuf>) -> Self {
        Self {
            ingestor,
            engine,
            scratch_root,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Scan one document. Scratch storage is released before returning,
    /// whether the scan succeeded or not.
    pub async fn scan(&self, doc: RawDocument) -> Result<ScanOutput, ScanError> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("scan", %request_id, file = %doc.filename);

        async move {
            let scratch = ScratchDir::create(self.scratch_root.as_deref())?;
            let result = self.scan_in(doc, &scratch).await;
            scratch.close();
            result
        }
        .instrument(span)
        .await
    }

    async fn scan_in(&self, doc: RawDocument, scratch: &ScratchDir) -> Result<ScanOutput, ScanError> {
        info!(
            "Scanning {} ({:?}, {} bytes) with {}",
            doc.filename,
            doc.kind,
            doc.data.len(),
            self.engine.name()
        );

        let pages = self.ingestor.ingest(doc, scratch).await?;

        let mut page_lines = Vec::with_capacity(pages.len());
        for page in &pages {
            let lines = self
                .engine
                .recognize(page)
                .await
                .map_err(|e| ScanError::OcrEngine {
                    page: page.index,
                    message: format!("{:#}", e),
                })?;
            debug!("Page {}: {} lines", page.index, lines.len());
            page_lines.push(lines);
        }

        let text = join_pages(&page_lines);
        info!("Scan complete: {} pages, {} chars", pages.len(), text.len());

        Ok(ScanOutput {
            text,
            pages: pages.len(),
        })
    }
}

/// Lines of a page joined by newlines, pages separated by a blank line.
fn join_pages(pages: &[Vec<String>]) -> String {
    pages
        .iter()
        .map(|lines| lines.join("\n"))
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ingest::PageImage;
    use crate::media::MediaKind;
    use std::io::Cursor;
    use std::path::Path;

    /// Engine returning canned lines, or failing on a given page.
    pub(crate) struct StubEngine {
        pub lines: Vec<String>,
        pub fail_on_page: Option<usize>,
    }

    impl StubEngine {
        pub(crate) fn with_lines(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                fail_on_page: None,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                lines: Vec::new(),
                fail_on_page: Some(1),
            }
        }
    }

    #[async_trait::async_trait]
    impl OcrEngine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        async fn recognize(&self, page: &PageImage) -> anyhow::Result<Vec<String>> {
            assert!(page.path.exists(), "page image must exist during OCR");
            if self.fail_on_page == Some(page.index) {
                anyhow::bail!("model crashed");
            }
            Ok(self.lines.clone())
        }
    }

    pub(crate) fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn scanner(engine: StubEngine, root: &Path) -> Scanner {
        Scanner::new(
            Ingestor::new("pdftoppm", 200),
            Arc::new(engine),
            Some(root.to_path_buf()),
        )
    }

    fn png_doc(data: Vec<u8>) -> RawDocument {
        RawDocument {
            filename: "receita.png".to_string(),
            kind: MediaKind::Png,
            data,
        }
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn test_scan_joins_lines() {
        let root = tempfile::tempdir().unwrap();
        let scanner = scanner(
            StubEngine::with_lines(&["Paracetamol 500mg", "de 8 em 8 horas"]),
            root.path(),
        );

        let output = scanner.scan(png_doc(png_bytes())).await.unwrap();
        assert_eq!(output.text, "Paracetamol 500mg\nde 8 em 8 horas");
        assert_eq!(output.pages, 1);
    }

    #[tokio::test]
    async fn test_scratch_released_on_success() {
        let root = tempfile::tempdir().unwrap();
        let scanner = scanner(StubEngine::with_lines(&["x"]), root.path());

        scanner.scan(png_doc(png_bytes())).await.unwrap();
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_ocr_failure_aborts_and_releases_scratch() {
        let root = tempfile::tempdir().unwrap();
        let scanner = scanner(StubEngine::failing(), root.path());

        let err = scanner.scan(png_doc(png_bytes())).await.unwrap_err();
        match err {
            ScanError::OcrEngine { page, message } => {
                assert_eq!(page, 1);
                assert!(message.contains("model crashed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_releases_scratch() {
        let root = tempfile::tempdir().unwrap();
        let scanner = scanner(StubEngine::with_lines(&["x"]), root.path());

        let err = scanner.scan(png_doc(b"garbage".to_vec())).await.unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_join_pages_keeps_page_order() {
        let pages = vec![
            vec!["Dr. Souza".to_string(), "Aspirina 100mg".to_string()],
            vec![],
            vec!["durante 7 dias".to_string()],
        ];
        assert_eq!(
            join_pages(&pages),
            "Dr. Souza\nAspirina 100mg\n\n\n\ndurante 7 dias"
        );
    }

    #[tokio::test]
    async fn test_empty_recognition() {
        let root = tempfile::tempdir().unwrap();
        let scanner = scanner(StubEngine::with_lines(&[]), root.path());

        let output = scanner.scan(png_doc(png_bytes())).await.unwrap();
        assert_eq!(output.text, "");
        assert_eq!(output.pages, 1);
    }
}
