use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    ingest_files_best_effort, provider_from_model_name, AnswerCoordinator, AnswerSynthesizer,
    AskOutcome, EmbeddingEndpointConfig, EmbeddingProvider, ExtractiveSynthesizer,
    FallbackSynthesizer, IngestionOptions, LopdfExtractor, OpenAiSynthesizer, VectorStore,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SOURCE_PREVIEW_CHARS: usize = 500;

type Store = VectorStore<Box<dyn EmbeddingProvider>>;
type Synthesizer = Box<dyn AnswerSynthesizer + Send + Sync>;

#[derive(Parser)]
#[command(name = "pdf-rag", version, about = "Ask grounded questions about a folder of PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding meta.sqlite and vectors.index
    #[arg(long, global = true, env = "PDF_RAG_STORAGE_DIR", default_value = "storage")]
    storage_dir: PathBuf,

    /// Embedding model: char-ngram[-<dims>] locally, anything else via EMBEDDING_ENDPOINT
    #[arg(long, global = true, env = "PDF_RAG_MODEL", default_value = "char-ngram")]
    model_name: String,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and index PDF files or folders.
    Ingest {
        /// PDF files or folders searched recursively.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Maximum characters per chunk.
        #[arg(long, default_value = "1000")]
        chunk_chars: usize,
        /// Characters carried over from the previous chunk.
        #[arg(long, default_value = "150")]
        overlap: usize,
    },
    /// Answer a question from the indexed documents, with sources.
    Ask {
        question: String,
        /// Number of passages to retrieve.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// List indexed documents.
    Docs,
    /// Remove a document and rebuild the index.
    Delete {
        /// File name as shown by `docs`.
        file_name: String,
    },
    /// Verify that the index and the metadata agree.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        storage_dir = %cli.storage_dir.display(),
        "pdf-rag boot"
    );

    let mut store = open_store(&cli.storage_dir, &cli.model_name)?;

    match cli.command {
        Command::Ingest {
            paths,
            chunk_chars,
            overlap,
        } => {
            let options = IngestionOptions {
                chunk_chars,
                overlap,
            };
            let report = ingest_files_best_effort(&mut store, &LopdfExtractor, &paths, &options)?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            for pdf in &report.ingested {
                println!("{}: {} chunks", pdf.file_name, pdf.chunk_count);
            }

            println!(
                "Ingestion complete: {} chunks from {} file(s), {} skipped.",
                report.total_chunks(),
                report.ingested.len(),
                report.skipped_files.len()
            );
        }
        Command::Ask { question, top_k } => {
            let coordinator = AnswerCoordinator::new(store, build_synthesizer()?);

            match coordinator.ask(&question, top_k).await? {
                AskOutcome::NoContext => println!("No relevant context found."),
                AskOutcome::Answered(answer) => {
                    println!("\n=== Answer ===\n");
                    println!("{}", answer.text);
                    println!("\n=== Sources ===\n");

                    for (index, passage) in answer.passages.iter().enumerate() {
                        println!(
                            "[{}] {} \u{2014} page {} (score: {:.3})",
                            index + 1,
                            passage.file_name,
                            passage.page,
                            passage.score
                        );
                        let preview: String =
                            passage.text.chars().take(SOURCE_PREVIEW_CHARS).collect();
                        println!("{preview} ...\n");
                    }
                }
            }
        }
        Command::Docs => {
            let docs = store.list_docs()?;
            if docs.is_empty() {
                println!("No documents ingested.");
            }
            for name in docs {
                let chunks = store.document_chunk_count(&name)?;
                println!("{name} ({chunks} chunks)");
            }
        }
        Command::Delete { file_name } => {
            let removed = store.delete_doc(&file_name)?;
            if removed == 0 {
                println!("No chunks found for {file_name}.");
            } else {
                println!("Deleted {removed} chunks of {file_name}; index rebuilt.");
            }
        }
        Command::Check => {
            let report = store.check_consistency()?;
            println!(
                "rows={} vectors={} missing_in_index={:?} orphaned_in_index={:?} digest_ok={}",
                report.table_rows,
                report.index_entries,
                report.missing_in_index,
                report.orphaned_in_index,
                report.index_digest_matches
            );
            if let Some(pending) = &report.pending_write {
                println!(
                    "pending write {} on {} since {}",
                    pending.op_id,
                    pending.op.file_name(),
                    pending.started_at.to_rfc3339()
                );
            }

            if !report.is_consistent {
                bail!(
                    "store at {} is inconsistent",
                    store.paths().root.display()
                );
            }
            println!("Store is consistent.");
        }
    }

    Ok(())
}

fn open_store(storage_dir: &Path, model_name: &str) -> anyhow::Result<Store> {
    let endpoint = EmbeddingEndpointConfig::from_env().context("invalid EMBEDDING_ENDPOINT")?;
    let embedder = provider_from_model_name(model_name, endpoint)?;
    let store = VectorStore::open(storage_dir, embedder)
        .with_context(|| format!("failed to open store at {}", storage_dir.display()))?;
    Ok(store)
}

fn build_synthesizer() -> anyhow::Result<Synthesizer> {
    let synthesizer: Synthesizer = match OpenAiSynthesizer::from_env()? {
        Some(hosted) => {
            info!(model = hosted.model(), "answering with hosted model");
            Box::new(FallbackSynthesizer::new(hosted, ExtractiveSynthesizer))
        }
        None => {
            info!("OPENAI_API_KEY not set; answering extractively");
            Box::new(ExtractiveSynthesizer)
        }
    };
    Ok(synthesizer)
}
