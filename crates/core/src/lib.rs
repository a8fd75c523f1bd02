mod blocking;

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod journal;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod synthesis;
pub mod traits;

pub use chunking::{chunk_pages, chunk_pages_with, split_into_paragraphs, ChunkingConfig};
pub use config::{EmbeddingEndpointConfig, OpenAiConfig};
pub use embeddings::{
    normalize, provider_from_model_name, CharacterNgramEmbedder, EmbeddingProvider, HttpEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{AskError, EmbedError, IngestError, StoreError, SynthesisError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{FlatIpIndex, Neighbor, NO_MATCH};
pub use ingest::{
    digest_file, discover_pdf_files, ingest_files_best_effort, IngestedPdf, IngestionReport,
    SkippedPdf,
};
pub use models::{Chunk, IngestionOptions, Passage, VectorId, VectorRecord};
pub use orchestrator::{Answer, AnswerCoordinator, AskOutcome};
pub use store::{ConsistencyReport, StoragePaths, VectorStore};
pub use synthesis::{
    build_prompt, cited_sources, ExtractiveSynthesizer, FallbackSynthesizer, OpenAiSynthesizer,
};
pub use traits::AnswerSynthesizer;
