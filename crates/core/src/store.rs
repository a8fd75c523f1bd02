use crate::embeddings::{normalize, EmbeddingProvider};
use crate::error::{EmbedError, StoreError};
use crate::index::{digest_hex, FlatIpIndex};
use crate::journal::{self, JournalEntry, PendingOp};
use crate::metadata::MetadataDb;
use crate::models::{Chunk, Passage, VectorId, VectorRecord};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const INDEX_FILE_NAME: &str = "vectors.index";
pub const METADATA_FILE_NAME: &str = "meta.sqlite";

const MODEL_KEY: &str = "embedding_model";
const DIMENSIONS_KEY: &str = "embedding_dim";
const INDEX_DIGEST_KEY: &str = "index_sha256";
const NEXT_ID_KEY: &str = "next_vector_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub root: PathBuf,
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            index: root.join(INDEX_FILE_NAME),
            metadata: root.join(METADATA_FILE_NAME),
            root,
        }
    }
}

/// Result of comparing the index id set against the `chunks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub table_rows: usize,
    pub index_entries: usize,
    /// Rows with no vector in the index.
    pub missing_in_index: Vec<VectorId>,
    /// Index vectors with no row.
    pub orphaned_in_index: Vec<VectorId>,
    /// Whether the index file on disk still hashes to the digest recorded at
    /// its last persist.
    pub index_digest_matches: bool,
    pub pending_write: Option<JournalEntry>,
    pub is_consistent: bool,
}

/// Nearest-neighbor index over chunk embeddings joined to citation rows.
///
/// Every mutation is persisted before it returns. `add` and `delete_doc`
/// take `&mut self`, which serializes writers inside one process. Nothing
/// guards against a second process writing to the same directory; callers
/// that share a storage directory across processes need an external lock.
pub struct VectorStore<E> {
    paths: StoragePaths,
    embedder: E,
    index: FlatIpIndex,
    metadata: MetadataDb,
}

impl<E: EmbeddingProvider> VectorStore<E> {
    /// Opens `storage_dir`, creating an empty store when nothing is there, and
    /// reconciles any write that was interrupted last time.
    pub fn open(storage_dir: impl AsRef<Path>, embedder: E) -> Result<Self, StoreError> {
        let paths = StoragePaths::new(storage_dir);
        fs::create_dir_all(&paths.root)?;

        let metadata = MetadataDb::open(&paths.metadata)?;
        let dimensions = embedder.dimensions();
        let index = load_or_create_index(&paths, &metadata, dimensions)?;

        let model = embedder.model_name();
        if let Some(previous) = metadata.meta(MODEL_KEY)? {
            if previous != model && !index.is_empty() {
                warn!(
                    previous = %previous,
                    current = %model,
                    "store was built with a different embedding model; scores may be meaningless"
                );
            }
        }
        metadata.set_meta(MODEL_KEY, &model)?;
        metadata.set_meta(DIMENSIONS_KEY, &dimensions.to_string())?;

        let mut store = Self {
            paths,
            embedder,
            index,
            metadata,
        };
        store.reconcile_pending_write()?;

        info!(
            storage_dir = %store.paths.root.display(),
            model = %model,
            dimensions,
            vectors = store.index.len(),
            "vector store loaded"
        );
        Ok(store)
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Embeds `chunks` and stores them under fresh, contiguous ids.
    ///
    /// Ids start after the highest id ever assigned, so ids of deleted
    /// documents are never handed out again.
    pub fn add(&mut self, file_name: &str, chunks: &[Chunk]) -> Result<Vec<VectorId>, StoreError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embed_normalized(&texts)?;

        let start_id = self.next_vector_id()?;
        let ids: Vec<VectorId> = (start_id..start_id + chunks.len() as VectorId).collect();

        let entry = journal::begin(
            &self.metadata,
            PendingOp::Add {
                file_name: file_name.to_string(),
                start_id,
                count: ids.len(),
            },
        )?;

        if let Err(error) = self.index.add_with_ids(&ids, &vectors) {
            journal::clear(&self.metadata)?;
            return Err(error);
        }

        let added: HashSet<VectorId> = ids.iter().copied().collect();
        if let Err(error) = self.persist_index() {
            self.index.remove_ids(&added);
            return Err(error);
        }

        let records: Vec<VectorRecord> = ids
            .iter()
            .zip(chunks)
            .map(|(vector_id, chunk)| VectorRecord {
                vector_id: *vector_id,
                file_name: file_name.to_string(),
                page: chunk.page,
                text: chunk.text.clone(),
            })
            .collect();

        if let Err(error) = self.metadata.insert_records(&records) {
            self.index.remove_ids(&added);
            match self
                .persist_index()
                .and_then(|()| journal::clear(&self.metadata))
            {
                Ok(()) => debug!(op_id = %entry.op_id, "rolled back index after failed insert"),
                Err(rollback_error) => warn!(
                    op_id = %entry.op_id,
                    error = %rollback_error,
                    "rollback incomplete; the store reconciles on next open"
                ),
            }
            return Err(error);
        }

        self.metadata
            .set_meta(NEXT_ID_KEY, &(start_id + ids.len() as VectorId).to_string())?;
        journal::clear(&self.metadata)?;

        info!(
            file_name,
            chunks = ids.len(),
            first_id = start_id,
            "added chunks to vector store"
        );
        Ok(ids)
    }

    /// Up to `top_k` passages, most similar first, in the order the index
    /// ranked them. Fewer come back when the index holds fewer vectors.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<Passage>, StoreError> {
        let k = top_k.min(self.index.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self
            .embed_normalized(&[text])?
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let mut passages = Vec::with_capacity(k);
        for neighbor in self.index.search(&query, k)? {
            if !neighbor.is_match() {
                continue;
            }

            match self.metadata.record(neighbor.id)? {
                Some(record) => passages.push(Passage::from_record(record, neighbor.score)),
                None => debug!(vector_id = neighbor.id, "indexed vector has no metadata row"),
            }
        }

        debug!(top_k, returned = passages.len(), "query complete");
        Ok(passages)
    }

    /// Distinct document names, sorted.
    pub fn list_docs(&self) -> Result<Vec<String>, StoreError> {
        self.metadata.document_names()
    }

    pub fn document_chunk_count(&self, file_name: &str) -> Result<usize, StoreError> {
        self.metadata.document_chunk_count(file_name)
    }

    /// Removes every row of `file_name` and rebuilds the index from the rows
    /// that remain. Returns the number of rows removed.
    pub fn delete_doc(&mut self, file_name: &str) -> Result<usize, StoreError> {
        if self.metadata.document_chunk_count(file_name)? == 0 {
            debug!(file_name, "nothing to delete");
            return Ok(0);
        }

        journal::begin(
            &self.metadata,
            PendingOp::Delete {
                file_name: file_name.to_string(),
            },
        )?;
        let removed = self.metadata.delete_document(file_name)?;
        self.rebuild_index()?;
        journal::clear(&self.metadata)?;

        info!(
            file_name,
            removed,
            remaining = self.index.len(),
            "deleted document and rebuilt index"
        );
        Ok(removed)
    }

    pub fn check_consistency(&self) -> Result<ConsistencyReport, StoreError> {
        let table: BTreeSet<VectorId> = self.metadata.vector_ids()?.into_iter().collect();
        let indexed: BTreeSet<VectorId> = self.index.ids().iter().copied().collect();

        let missing_in_index: Vec<VectorId> = table.difference(&indexed).copied().collect();
        let orphaned_in_index: Vec<VectorId> = indexed.difference(&table).copied().collect();

        let index_digest_matches = match self.metadata.meta(INDEX_DIGEST_KEY)? {
            Some(recorded) => digest_hex(&fs::read(&self.paths.index)?) == recorded,
            None => false,
        };
        let pending_write = journal::pending(&self.metadata)?;

        let is_consistent = missing_in_index.is_empty()
            && orphaned_in_index.is_empty()
            && index_digest_matches
            && pending_write.is_none();

        let report = ConsistencyReport {
            table_rows: table.len(),
            index_entries: indexed.len(),
            missing_in_index,
            orphaned_in_index,
            index_digest_matches,
            pending_write,
            is_consistent,
        };

        if report.is_consistent {
            info!(vectors = report.index_entries, "index and metadata are consistent");
        } else {
            warn!(
                missing_in_index = report.missing_in_index.len(),
                orphaned_in_index = report.orphaned_in_index.len(),
                digest_matches = report.index_digest_matches,
                pending_write = report.pending_write.is_some(),
                "index and metadata disagree"
            );
        }

        Ok(report)
    }

    pub fn meta_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.metadata.meta(key)
    }

    pub fn set_meta_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.metadata.set_meta(key, value)
    }

    fn embed_normalized(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut vectors = self.embedder.embed(texts)?;

        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }

        let dimensions = self.index.dimensions();
        for vector in &mut vectors {
            if vector.len() != dimensions {
                return Err(EmbedError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                }
                .into());
            }
            normalize(vector);
        }

        Ok(vectors)
    }

    fn next_vector_id(&self) -> Result<VectorId, StoreError> {
        let after_table = self.metadata.max_vector_id()?.map_or(0, |max| max + 1);
        let high_water = match self.metadata.meta(NEXT_ID_KEY)? {
            Some(raw) => raw.parse::<VectorId>().map_err(|error| {
                StoreError::Integrity(format!("invalid {NEXT_ID_KEY} value {raw:?}: {error}"))
            })?,
            None => 0,
        };
        Ok(after_table.max(high_water))
    }

    fn persist_index(&self) -> Result<(), StoreError> {
        let digest = self.index.save(&self.paths.index)?;
        self.metadata.set_meta(INDEX_DIGEST_KEY, &digest)
    }

    /// Re-embeds every remaining row in id order and swaps in a fresh index
    /// keyed by the original ids.
    fn rebuild_index(&mut self) -> Result<(), StoreError> {
        let records = self.metadata.records()?;
        let mut rebuilt = FlatIpIndex::new(self.index.dimensions());

        if !records.is_empty() {
            let texts: Vec<&str> = records.iter().map(|record| record.text.as_str()).collect();
            let vectors = self.embed_normalized(&texts)?;
            let ids: Vec<VectorId> = records.iter().map(|record| record.vector_id).collect();
            rebuilt.add_with_ids(&ids, &vectors)?;
        }

        self.index = rebuilt;
        self.persist_index()
    }

    fn reconcile_pending_write(&mut self) -> Result<(), StoreError> {
        let Some(entry) = journal::pending(&self.metadata)? else {
            return Ok(());
        };

        warn!(
            op_id = %entry.op_id,
            started_at = %entry.started_at.to_rfc3339(),
            file_name = entry.op.file_name(),
            "reconciling interrupted write"
        );

        match &entry.op {
            PendingOp::Add {
                start_id, count, ..
            } => {
                let end = start_id + *count as VectorId;
                let rows = self.metadata.ids_in_range(*start_id, end)?;
                let indexed: HashSet<VectorId> = self.index.ids().iter().copied().collect();
                let vectors = (*start_id..end).filter(|id| indexed.contains(id)).count();

                if rows.len() == *count && vectors == *count {
                    self.metadata.set_meta(NEXT_ID_KEY, &end.to_string())?;
                    info!(op_id = %entry.op_id, "interrupted add had completed; keeping it");
                } else {
                    let discarded = self.metadata.delete_id_range(*start_id, end)?;
                    let range: HashSet<VectorId> = (*start_id..end).collect();
                    let removed = self.index.remove_ids(&range);
                    self.persist_index()?;
                    info!(
                        op_id = %entry.op_id,
                        rows = discarded,
                        vectors = removed,
                        "discarded incomplete add"
                    );
                }
            }
            PendingOp::Delete { file_name } => {
                self.metadata.delete_document(file_name)?;
                self.rebuild_index()?;
                info!(op_id = %entry.op_id, "completed interrupted delete");
            }
        }

        journal::clear(&self.metadata)
    }
}

fn load_or_create_index(
    paths: &StoragePaths,
    metadata: &MetadataDb,
    dimensions: usize,
) -> Result<FlatIpIndex, StoreError> {
    if paths.index.exists() {
        let (index, digest) = FlatIpIndex::load(&paths.index)?;

        if let Some(recorded) = metadata.meta(INDEX_DIGEST_KEY)? {
            if recorded != digest {
                warn!(
                    path = %paths.index.display(),
                    "index file changed outside the store; run a consistency check"
                );
            }
        }

        if index.dimensions() == dimensions {
            return Ok(index);
        }

        if !index.is_empty() || metadata.chunk_count()? > 0 {
            return Err(StoreError::DimensionMismatch {
                expected: dimensions,
                actual: index.dimensions(),
            });
        }

        warn!(
            previous = index.dimensions(),
            current = dimensions,
            "recreating empty index for new embedding dimension"
        );
    }

    let index = FlatIpIndex::new(dimensions);
    let digest = index.save(&paths.index)?;
    metadata.set_meta(INDEX_DIGEST_KEY, &digest)?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use tempfile::tempdir;

    const DIMENSIONS: usize = 256;

    fn embedder() -> CharacterNgramEmbedder {
        CharacterNgramEmbedder {
            dimensions: DIMENSIONS,
        }
    }

    fn chunk(text: &str, page: u32, chunk_idx: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            page,
            chunk_idx,
        }
    }

    fn doc_chunks(prefix: &str) -> Vec<Chunk> {
        vec![
            chunk(&format!("{prefix} hydraulic pump pressure relief valve settings"), 1, 0),
            chunk(&format!("{prefix} electrical wiring diagram for the control cabinet"), 1, 1),
            chunk(&format!("{prefix} maintenance schedule and lubrication intervals"), 2, 0),
        ]
    }

    /// Returns vectors scaled away from unit length.
    struct UnnormalizedEmbedder(CharacterNgramEmbedder);

    impl EmbeddingProvider for UnnormalizedEmbedder {
        fn model_name(&self) -> String {
            "scaled".to_string()
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let vectors = self.0.embed(texts)?;
            Ok(vectors
                .into_iter()
                .map(|vector| vector.into_iter().map(|value| value * 7.5).collect())
                .collect())
        }
    }

    struct FailingEmbedder;

    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> String {
            "failing".to_string()
        }

        fn dimensions(&self) -> usize {
            DIMENSIONS
        }

        fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::BackendResponse {
                backend: "test".to_string(),
                details: "model unavailable".to_string(),
            })
        }
    }

    #[test]
    fn fresh_store_is_empty_and_persisted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::open(dir.path().join("storage"), embedder())?;

        assert!(store.is_empty());
        assert!(store.paths().index.exists());
        assert!(store.paths().metadata.exists());
        assert!(store.query("anything at all", 5)?.is_empty());
        assert!(store.list_docs()?.is_empty());
        assert!(store.check_consistency()?.is_consistent);
        Ok(())
    }

    #[test]
    fn exact_chunk_text_is_the_top_hit() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        let chunks = doc_chunks("manual");
        let ids = store.add("a.pdf", &chunks)?;

        assert_eq!(ids, vec![0, 1, 2]);
        for (chunk, id) in chunks.iter().zip(&ids) {
            let hits = store.query(&chunk.text, 3)?;
            assert_eq!(hits[0].vector_id, *id);
            assert_eq!(hits[0].text, chunk.text);
            assert_eq!(hits[0].page, chunk.page);
            assert_eq!(hits[0].file_name, "a.pdf");
            assert!((hits[0].score - 1.0).abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn store_normalizes_provider_output() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), UnnormalizedEmbedder(embedder()))?;
        let chunks = doc_chunks("scaled");
        store.add("a.pdf", &chunks)?;

        let hits = store.query(&chunks[1].text, 1)?;
        assert!((hits[0].score - 1.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn results_are_capped_by_index_size() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &doc_chunks("short"))?;

        let hits = store.query("pump pressure", 10)?;
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(store.query("pump pressure", 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn list_docs_is_sorted_and_deduplicated() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("b.pdf", &doc_chunks("bravo"))?;
        store.add("a.pdf", &doc_chunks("alpha"))?;
        store.add("b.pdf", &doc_chunks("bravo again"))?;
        store.add("c.pdf", &[])?;

        assert_eq!(store.list_docs()?, vec!["a.pdf", "b.pdf"]);
        assert_eq!(store.document_chunk_count("b.pdf")?, 6);
        Ok(())
    }

    #[test]
    fn delete_doc_keeps_ids_joined() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &doc_chunks("alpha"))?;
        let b_chunks = doc_chunks("bravo");
        let b_ids = store.add("b.pdf", &b_chunks)?;

        assert_eq!(store.delete_doc("a.pdf")?, 3);
        assert_eq!(store.list_docs()?, vec!["b.pdf"]);

        let report = store.check_consistency()?;
        assert!(report.is_consistent, "{report:?}");
        assert_eq!(report.table_rows, report.index_entries);

        for (chunk, id) in b_chunks.iter().zip(&b_ids) {
            let hits = store.query(&chunk.text, 6)?;
            assert!(hits.iter().all(|hit| hit.file_name != "a.pdf"));
            assert_eq!(hits[0].vector_id, *id);
            assert_eq!(hits[0].text, chunk.text);
        }
        Ok(())
    }

    #[test]
    fn deleting_unknown_doc_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &doc_chunks("alpha"))?;

        assert_eq!(store.delete_doc("missing.pdf")?, 0);
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[test]
    fn deleting_last_doc_leaves_queryable_empty_store() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &doc_chunks("alpha"))?;
        store.delete_doc("a.pdf")?;

        assert!(store.is_empty());
        assert!(store.query("hydraulic pump", 5)?.is_empty());
        assert!(store.check_consistency()?.is_consistent);
        Ok(())
    }

    #[test]
    fn ids_are_not_reused_after_tail_delete() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &doc_chunks("alpha"))?;
        store.add("b.pdf", &doc_chunks("bravo"))?;
        store.delete_doc("b.pdf")?;

        let ids = store.add("c.pdf", &doc_chunks("charlie"))?;
        assert_eq!(ids, vec![6, 7, 8]);
        Ok(())
    }

    #[test]
    fn reopened_store_answers_identically() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let before = {
            let mut store = VectorStore::open(dir.path(), embedder())?;
            store.add("a.pdf", &doc_chunks("alpha"))?;
            store.add("b.pdf", &doc_chunks("bravo"))?;
            store.delete_doc("a.pdf")?;
            store.query("wiring diagram control cabinet", 4)?
        };

        let store = VectorStore::open(dir.path(), embedder())?;
        let after = store.query("wiring diagram control cabinet", 4)?;

        assert_eq!(before, after);
        assert!(store.check_consistency()?.is_consistent);
        assert_eq!(store.meta_value(MODEL_KEY)?.as_deref(), Some("char-ngram-256"));
        Ok(())
    }

    #[test]
    fn embedding_failure_leaves_store_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), FailingEmbedder)?;

        let result = store.add("a.pdf", &doc_chunks("alpha"));
        assert!(matches!(result, Err(StoreError::Embedding(_))));
        assert!(store.list_docs()?.is_empty());
        assert!(store.check_consistency()?.is_consistent);
        Ok(())
    }

    #[test]
    fn oversized_top_k_returns_every_vector() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &[chunk("hello", 1, 0)])?;

        let hits = store.query("hello", usize::MAX)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "hello");
        Ok(())
    }

    #[test]
    fn indexed_vector_without_row_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        let chunks = doc_chunks("alpha");
        store.add("a.pdf", &chunks)?;

        let orphan_text = "orphaned vector that never got a metadata row";
        let orphan = store.embed_normalized(&[orphan_text])?;
        store.index.add_with_ids(&[3], &orphan)?;
        store.persist_index()?;

        let hits = store.query(orphan_text, 4)?;
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|hit| hit.vector_id != 3));
        assert!(hits.iter().all(|hit| hit.file_name == "a.pdf"));
        assert_eq!(store.check_consistency()?.orphaned_in_index, vec![3]);
        Ok(())
    }

    #[test]
    fn interrupted_add_is_discarded_on_open() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let mut store = VectorStore::open(dir.path(), embedder())?;
            store.add("a.pdf", &doc_chunks("alpha"))?;

            // Index persisted, rows never written.
            let orphan = store.embed_normalized(&["orphaned vector text"])?;
            journal::begin(
                &store.metadata,
                PendingOp::Add {
                    file_name: "b.pdf".to_string(),
                    start_id: 3,
                    count: 1,
                },
            )?;
            store.index.add_with_ids(&[3], &orphan)?;
            store.persist_index()?;

            let report = store.check_consistency()?;
            assert_eq!(report.orphaned_in_index, vec![3]);
            assert!(!report.is_consistent);
        }

        let store = VectorStore::open(dir.path(), embedder())?;
        let report = store.check_consistency()?;
        assert!(report.is_consistent, "{report:?}");
        assert_eq!(store.len(), 3);
        assert_eq!(store.list_docs()?, vec!["a.pdf"]);
        Ok(())
    }

    #[test]
    fn interrupted_delete_is_completed_on_open() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let mut store = VectorStore::open(dir.path(), embedder())?;
            store.add("a.pdf", &doc_chunks("alpha"))?;
            store.add("b.pdf", &doc_chunks("bravo"))?;

            // Rows removed, index never rebuilt.
            journal::begin(
                &store.metadata,
                PendingOp::Delete {
                    file_name: "a.pdf".to_string(),
                },
            )?;
            store.metadata.delete_document("a.pdf")?;
            assert!(store.add("c.pdf", &doc_chunks("charlie")).is_err());
        }

        let store = VectorStore::open(dir.path(), embedder())?;
        assert!(store.check_consistency()?.is_consistent);
        assert_eq!(store.len(), 3);
        let hits = store.query("alpha hydraulic pump pressure relief valve settings", 6)?;
        assert!(hits.iter().all(|hit| hit.file_name == "b.pdf"));
        Ok(())
    }

    #[test]
    fn dimension_change_is_rejected_once_populated() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = VectorStore::open(dir.path(), CharacterNgramEmbedder { dimensions: 32 })?;
            assert_eq!(store.dimensions(), 32);
        }
        {
            let mut store = VectorStore::open(dir.path(), embedder())?;
            assert_eq!(store.dimensions(), DIMENSIONS);
            store.add("a.pdf", &doc_chunks("alpha"))?;
        }

        let result = VectorStore::open(dir.path(), CharacterNgramEmbedder { dimensions: 32 });
        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch {
                expected: 32,
                actual: DIMENSIONS
            })
        ));
        Ok(())
    }

    #[test]
    fn tampered_index_file_fails_the_check() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = VectorStore::open(dir.path(), embedder())?;
        store.add("a.pdf", &doc_chunks("alpha"))?;

        FlatIpIndex::new(DIMENSIONS).save(&store.paths().index)?;

        let report = store.check_consistency()?;
        assert!(!report.index_digest_matches);
        assert!(!report.is_consistent);
        Ok(())
    }
}
