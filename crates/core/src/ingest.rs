use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::extractor::PdfExtractor;
use crate::store::VectorStore;
use crate::{IngestError, IngestionOptions};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Meta key prefix under which each ingested file's SHA-256 is recorded.
pub const CHECKSUM_KEY_PREFIX: &str = "checksum:";

/// Expands files and directories into a sorted, de-duplicated list of PDFs.
/// Directories are walked recursively; explicit file arguments are kept only
/// when they carry a `.pdf` extension.
pub fn discover_pdf_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        for entry in WalkDir::new(input)
            .into_iter()
            .filter_map(|item| item.ok())
        {
            if entry.file_type().is_file() && is_pdf(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files.sort_unstable();
    files.dedup();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedPdf {
    pub file_name: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub ingested: Vec<IngestedPdf>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn total_chunks(&self) -> usize {
        self.ingested.iter().map(|pdf| pdf.chunk_count).sum()
    }
}

/// Extracts, chunks and stores every PDF under `inputs`.
///
/// A file that fails at any step is recorded in `skipped_files` and the
/// batch moves on. The chunk configuration is validated before any file is
/// read.
pub fn ingest_files_best_effort<E, X>(
    store: &mut VectorStore<E>,
    extractor: &X,
    inputs: &[PathBuf],
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError>
where
    E: EmbeddingProvider,
    X: PdfExtractor + ?Sized,
{
    let config = ChunkingConfig::try_from(options)?;
    let files = discover_pdf_files(inputs);

    if files.is_empty() {
        let listed = inputs
            .iter()
            .map(|input| input.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {listed}"
        )));
    }

    let mut report = IngestionReport::default();

    for path in files {
        match ingest_one(store, extractor, &path, config) {
            Ok(ingested) => {
                info!(
                    file_name = %ingested.file_name,
                    chunks = ingested.chunk_count,
                    "ingested pdf"
                );
                report.ingested.push(ingested);
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipping pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}

fn ingest_one<E, X>(
    store: &mut VectorStore<E>,
    extractor: &X,
    path: &Path,
    config: ChunkingConfig,
) -> Result<IngestedPdf, IngestError>
where
    E: EmbeddingProvider,
    X: PdfExtractor + ?Sized,
{
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let checksum = digest_file(path)?;
    let pages = extractor.extract_pages(path)?;
    let chunks = chunk_pages(&pages, config);

    store.add(&file_name, &chunks)?;
    store.set_meta_value(&format!("{CHECKSUM_KEY_PREFIX}{file_name}"), &checksum)?;

    Ok(IngestedPdf {
        file_name,
        chunk_count: chunks.len(),
    })
}
