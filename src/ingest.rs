//! Document ingestion: turn an upload into page images on scratch storage.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::media::MediaKind;
use crate::scratch::ScratchDir;

/// HEIF major/compatible brands we accept in the `ftyp` box.
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// An uploaded document. Lives for one request only.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub filename: String,
    pub kind: MediaKind,
    pub data: Vec<u8>,
}

/// One page ready for OCR (1-indexed).
#[derive(Debug, Clone)]
pub struct PageImage {
    pub index: usize,
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Turns uploads into page images.
#[derive(Debug, Clone)]
pub struct Ingestor {
    pdftoppm_bin: String,
    pdf_dpi: u32,
}

impl Ingestor {
    pub fn new(pdftoppm_bin: &str, pdf_dpi: u32) -> Self {
        Self {
            pdftoppm_bin: pdftoppm_bin.to_string(),
            pdf_dpi,
        }
    }

    /// Produce the pages of `doc`, in order, as files inside `scratch`.
    pub async fn ingest(
        &self,
        doc: RawDocument,
        scratch: &ScratchDir,
    ) -> Result<Vec<PageImage>, ScanError> {
        if doc.data.is_empty() {
            return Err(ScanError::Decode(format!("{} is empty", doc.filename)));
        }

        match doc.kind {
            MediaKind::Pdf => self.ingest_pdf(doc, scratch).await,
            MediaKind::Heif => ingest_heif(doc, scratch).await,
            _ => ingest_raster(doc, scratch).await,
        }
    }

    async fn ingest_pdf(
        &self,
        doc: RawDocument,
        scratch: &ScratchDir,
    ) -> Result<Vec<PageImage>, ScanError> {
        let pdf_path = scratch.file("upload.pdf");
        let target = pdf_path.clone();
        let data = doc.data;

        let page_count = tokio::task::spawn_blocking(move || -> Result<usize, ScanError> {
            let count = count_pdf_pages(&data)?;
            std::fs::write(&target, &data)?;
            Ok(count)
        })
        .await
        .map_err(|e| ScanError::Processing(format!("PDF task failed: {}", e)))??;

        info!(
            "Rasterizing {} ({} pages at {} dpi)",
            doc.filename, page_count, self.pdf_dpi
        );

        let output = Command::new(&self.pdftoppm_bin)
            .arg("-r")
            .arg(self.pdf_dpi.to_string())
            .arg("-png")
            .arg(&pdf_path)
            .arg(scratch.file("page"))
            .output()
            .await
            .map_err(|e| {
                ScanError::Processing(format!("cannot run {}: {}", self.pdftoppm_bin, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Decode(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let dir = scratch.path().to_path_buf();
        let files = tokio::task::spawn_blocking(move || collect_page_files(&dir))
            .await
            .map_err(|e| ScanError::Processing(format!("page listing task failed: {}", e)))??;
        if files.is_empty() {
            return Err(ScanError::Decode(format!(
                "no pages rasterized from {}",
                doc.filename
            )));
        }
        if files.len() != page_count {
            warn!(
                "Rasterized {} pages but {} declares {}",
                files.len(),
                doc.filename,
                page_count
            );
        }

        Ok(files
            .into_iter()
            .enumerate()
            .map(|(i, path)| PageImage {
                index: i + 1,
                path,
                kind: MediaKind::Png,
            })
            .collect())
    }
}

/// Decode a raster image and store it as a single RGB PNG page.
async fn ingest_raster(doc: RawDocument, scratch: &ScratchDir) -> Result<Vec<PageImage>, ScanError> {
    let format = doc
        .kind
        .image_format()
        .ok_or_else(|| ScanError::UnsupportedMediaType(doc.kind.mime().to_string()))?;
    let path = scratch.file("page-1.png");
    let target = path.clone();
    let data = doc.data;

    let (width, height) = tokio::task::spawn_blocking(move || -> Result<(u32, u32), ScanError> {
        let img = image::load_from_memory_with_format(&data, format)
            .map_err(|e| ScanError::Decode(e.to_string()))?;
        let rgb = img.to_rgb8();
        rgb.save_with_format(&target, image::ImageFormat::Png)
            .map_err(|e| ScanError::Processing(format!("cannot write page image: {}", e)))?;
        Ok(rgb.dimensions())
    })
    .await
    .map_err(|e| ScanError::Processing(format!("decode task failed: {}", e)))??;

    debug!("Decoded {} ({}x{})", doc.filename, width, height);
    Ok(vec![PageImage {
        index: 1,
        path,
        kind: MediaKind::Png,
    }])
}

/// HEIF has no decoder here; validate the container and pass it through.
async fn ingest_heif(doc: RawDocument, scratch: &ScratchDir) -> Result<Vec<PageImage>, ScanError> {
    if !is_heif(&doc.data) {
        return Err(ScanError::Decode(format!(
            "{} is not a HEIC/HEIF image",
            doc.filename
        )));
    }

    let path = scratch.file(&format!("page-1.{}", MediaKind::Heif.extension()));
    tokio::fs::write(&path, &doc.data).await?;
    Ok(vec![PageImage {
        index: 1,
        path,
        kind: MediaKind::Heif,
    }])
}

fn count_pdf_pages(data: &[u8]) -> Result<usize, ScanError> {
    let doc = lopdf::Document::load_from(Cursor::new(data))
        .map_err(|e| ScanError::Decode(format!("Failed to load PDF: {}", e)))?;
    match doc.get_pages().len() {
        0 => Err(ScanError::Decode("PDF has no pages".to_string())),
        n => Ok(n),
    }
}

fn is_heif(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }
    let box_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let end = box_len.clamp(12, data.len());

    // Major brand, then compatible brands after the minor version.
    std::iter::once(&data[8..12])
        .chain(data.get(16..end).unwrap_or(&[]).chunks_exact(4))
        .any(|brand| HEIF_BRANDS.iter().any(|known| brand == &known[..]))
}

/// Rasterized pages (`page-<n>.png`) in page order.
fn collect_page_files(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let number = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("page-"))
            .and_then(|n| n.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(number) = number {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::png_bytes;
    use lopdf::{dictionary, Dictionary, Document, Object, Stream};

    fn sample_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn heic_header() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 24];
        data.extend_from_slice(b"ftypheic");
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"mif1heic");
        data.extend_from_slice(&[0; 16]);
        data
    }

    fn doc(kind: MediaKind, data: Vec<u8>) -> RawDocument {
        RawDocument {
            filename: format!("upload.{}", kind.extension()),
            kind,
            data,
        }
    }

    #[tokio::test]
    async fn test_png_becomes_single_page() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let ingestor = Ingestor::new("pdftoppm", 200);

        let pages = ingestor.ingest(doc(MediaKind::Png, png_bytes()), &scratch).await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 1);
        assert!(pages[0].path.starts_with(scratch.path()));
        let decoded = image::open(&pages[0].path).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_decode_error() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let ingestor = Ingestor::new("pdftoppm", 200);

        let err = ingestor
            .ingest(doc(MediaKind::Jpeg, b"definitely not a jpeg".to_vec()), &scratch)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_upload_is_decode_error() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let ingestor = Ingestor::new("pdftoppm", 200);

        let err = ingestor.ingest(doc(MediaKind::Png, Vec::new()), &scratch).await.unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }

    #[tokio::test]
    async fn test_heif_passes_through() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let ingestor = Ingestor::new("pdftoppm", 200);

        let pages = ingestor.ingest(doc(MediaKind::Heif, heic_header()), &scratch).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].kind, MediaKind::Heif);
        assert_eq!(std::fs::read(&pages[0].path).unwrap(), heic_header());

        let err = ingestor
            .ingest(doc(MediaKind::Heif, png_bytes()), &scratch)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_decode_error() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let ingestor = Ingestor::new("pdftoppm", 200);

        let err = ingestor
            .ingest(doc(MediaKind::Pdf, b"%PDF-1.4 truncated".to_vec()), &scratch)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }

    #[test]
    fn test_count_pdf_pages() {
        assert_eq!(count_pdf_pages(&sample_pdf(3)).unwrap(), 3);
        assert!(count_pdf_pages(b"hello").is_err());
    }

    #[test]
    fn test_is_heif() {
        assert!(is_heif(&heic_header()));
        assert!(!is_heif(b"\0\0\0\x18ftypisom\0\0\0\0"));
        assert!(!is_heif(b"short"));
    }

    /// Stand-in for pdftoppm: writes three empty pages out of order.
    #[cfg(unix)]
    fn fake_rasterizer(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-pdftoppm");
        std::fs::write(
            &script,
            "#!/bin/sh\n# args: -r <dpi> -png <pdf> <prefix>\n: > \"$5-2.png\"\n: > \"$5-10.png\"\n: > \"$5-1.png\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_pages_indexed_in_page_order() {
        let bin_dir = tempfile::tempdir().unwrap();
        let rasterizer = fake_rasterizer(bin_dir.path());
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let ingestor = Ingestor::new(rasterizer.to_str().unwrap(), 200);

        let pages = ingestor.ingest(doc(MediaKind::Pdf, sample_pdf(3)), &scratch).await.unwrap();

        let summary: Vec<(usize, String)> = pages
            .iter()
            .map(|p| (p.index, p.path.file_name().unwrap().to_string_lossy().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "page-1.png".to_string()),
                (2, "page-2.png".to_string()),
                (3, "page-10.png".to_string()),
            ]
        );
        assert!(pages.iter().all(|p| p.kind == MediaKind::Png));
        assert!(scratch.file("upload.pdf").exists());
    }

    #[test]
    fn test_collect_page_files_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "upload.pdf", "page-x.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = collect_page_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-10.png"]);
    }
}
