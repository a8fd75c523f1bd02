use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid embedding model name: {0}")]
    InvalidModel(String),

    #[error("model {0} needs an embedding endpoint (set EMBEDDING_ENDPOINT)")]
    MissingEndpoint(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index codec error: {0}")]
    IndexCodec(#[from] bincode::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding provider failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index dimension {actual} does not match provider dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector id {0} is already present in the index")]
    DuplicateId(i64),

    #[error("corrupt index file: {0}")]
    CorruptIndex(String),

    #[error("index and metadata disagree: {0}")]
    Integrity(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("synthesis request failed: {0}")]
    Request(String),

    #[error("synthesizer not configured: {0}")]
    NotConfigured(String),

    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("retrieval failed: {0}")]
    Store(#[from] StoreError),

    #[error("answer generation failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_failures_keep_their_cause_through_the_store() {
        let error = StoreError::from(EmbedError::CountMismatch {
            expected: 3,
            actual: 2,
        });
        assert_eq!(
            error.to_string(),
            "embedding provider failed: provider returned 2 embeddings for 3 inputs"
        );
    }

    #[test]
    fn ask_errors_distinguish_retrieval_from_generation() {
        let retrieval = AskError::from(StoreError::Integrity("missing rows".to_string()));
        let generation = AskError::from(SynthesisError::Request("timeout".to_string()));

        assert!(matches!(retrieval, AskError::Store(_)));
        assert!(matches!(generation, AskError::Synthesis(_)));
        assert!(retrieval.to_string().starts_with("retrieval failed"));
        assert!(generation.to_string().starts_with("answer generation failed"));
    }
}
