use serde::{Deserialize, Serialize};

/// Identifier shared by an index entry and its `chunks` row.
pub type VectorId = i64;

/// A citeable span of one page, addressed by `(page, chunk_idx)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
    pub chunk_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub vector_id: VectorId,
    pub file_name: String,
    pub page: u32,
    pub text: String,
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub vector_id: VectorId,
    pub score: f32,
    pub file_name: String,
    pub page: u32,
    pub text: String,
}

impl Passage {
    pub(crate) fn from_record(record: VectorRecord, score: f32) -> Self {
        Self {
            vector_id: record.vector_id,
            score,
            file_name: record.file_name,
            page: record.page,
            text: record.text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_chars: usize,
    pub overlap: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_chars: 1_000,
            overlap: 150,
        }
    }
}
