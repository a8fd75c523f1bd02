//! Exact inner-product index over unit vectors, addressed by explicit ids.
//!
//! Search is brute force. Vectors live in one flat `Vec<f32>` with `ids[i]`
//! owning the row `vectors[i * dim..(i + 1) * dim]`. Because every entry
//! carries its own id, rebuilding or reloading never shifts the ids that the
//! metadata table joins on.

use crate::error::StoreError;
use crate::models::VectorId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Id reported for result slots the index could not fill.
pub const NO_MATCH: VectorId = -1;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: VectorId,
    pub score: f32,
}

impl Neighbor {
    pub fn none() -> Self {
        Self {
            id: NO_MATCH,
            score: f32::NEG_INFINITY,
        }
    }

    pub fn is_match(&self) -> bool {
        self.id != NO_MATCH
    }
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    dimensions: u64,
    ids: &'a [VectorId],
    vectors: &'a [f32],
}

#[derive(Deserialize)]
struct IndexFile {
    version: u32,
    dimensions: u64,
    ids: Vec<VectorId>,
    vectors: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimensions: usize,
    ids: Vec<VectorId>,
    vectors: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }

    /// Appends `vectors` under `ids`. The batch is validated as a whole, so a
    /// rejected call leaves the index untouched.
    pub fn add_with_ids(
        &mut self,
        ids: &[VectorId],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        if ids.len() != vectors.len() {
            return Err(StoreError::Integrity(format!(
                "{} ids supplied for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }

        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimensions) {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        let mut seen: HashSet<VectorId> = self.ids.iter().copied().collect();
        for id in ids {
            if *id == NO_MATCH || !seen.insert(*id) {
                return Err(StoreError::DuplicateId(*id));
            }
        }

        self.ids.extend_from_slice(ids);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Returns exactly `k` neighbors, best first. Ties fall back to ascending
    /// id; slots past `len()` hold [`Neighbor::none`]. All `k` slots are
    /// allocated, so callers bound `k` by `len()` plus any padding they want.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        if query.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .ids
            .iter()
            .zip(self.vectors.chunks_exact(self.dimensions.max(1)))
            .map(|(id, row)| Neighbor {
                id: *id,
                score: dot(query, row),
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.id.cmp(&right.id))
        });
        scored.truncate(k);
        scored.resize(k, Neighbor::none());
        Ok(scored)
    }

    /// Drops every entry whose id is in `ids`; returns how many were removed.
    pub fn remove_ids(&mut self, ids: &HashSet<VectorId>) -> usize {
        let before = self.ids.len();
        let dimensions = self.dimensions;
        let mut kept_ids = Vec::with_capacity(before);
        let mut kept_vectors = Vec::with_capacity(self.vectors.len());

        for (id, row) in self.ids.iter().zip(self.vectors.chunks_exact(dimensions.max(1))) {
            if !ids.contains(id) {
                kept_ids.push(*id);
                kept_vectors.extend_from_slice(row);
            }
        }

        self.ids = kept_ids;
        self.vectors = kept_vectors;
        before - self.ids.len()
    }

    /// Writes the index next to `path` and renames it into place. Returns the
    /// SHA-256 of the written bytes.
    pub fn save(&self, path: &Path) -> Result<String, StoreError> {
        let bytes = bincode::serialize(&IndexFileRef {
            version: FORMAT_VERSION,
            dimensions: self.dimensions as u64,
            ids: &self.ids,
            vectors: &self.vectors,
        })?;

        let staging = path.with_extension("index.tmp");
        fs::write(&staging, &bytes)?;
        fs::rename(&staging, path)?;
        Ok(digest_hex(&bytes))
    }

    /// Reads an index written by [`FlatIpIndex::save`] together with the
    /// digest of the bytes read.
    pub fn load(path: &Path) -> Result<(Self, String), StoreError> {
        let bytes = fs::read(path)?;
        let digest = digest_hex(&bytes);
        let file: IndexFile = bincode::deserialize(&bytes)?;

        if file.version != FORMAT_VERSION {
            return Err(StoreError::CorruptIndex(format!(
                "unsupported index format version {}",
                file.version
            )));
        }

        let dimensions = file.dimensions as usize;
        if dimensions == 0 || file.vectors.len() != file.ids.len() * dimensions {
            return Err(StoreError::CorruptIndex(format!(
                "{} values cannot hold {} vectors of dimension {}",
                file.vectors.len(),
                file.ids.len(),
                dimensions
            )));
        }

        let unique: HashSet<VectorId> = file.ids.iter().copied().collect();
        if unique.len() != file.ids.len() {
            return Err(StoreError::CorruptIndex("duplicate ids in index file".to_string()));
        }

        Ok((
            Self {
                dimensions,
                ids: file.ids,
                vectors: file.vectors,
            },
            digest,
        ))
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
