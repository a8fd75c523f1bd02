//! Write-ahead marker for mutations that touch both the index file and the
//! metadata database.
//!
//! The entry is written before either resource changes and removed once both
//! are durable. A store that opens and finds an entry reconciles it before
//! serving anything (see `VectorStore::open`). Only one entry exists at a
//! time, so a leftover entry blocks further writes until it is reconciled.

use crate::error::StoreError;
use crate::metadata::MetadataDb;
use crate::models::VectorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const JOURNAL_KEY: &str = "journal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingOp {
    Add {
        file_name: String,
        start_id: VectorId,
        count: usize,
    },
    Delete {
        file_name: String,
    },
}

impl PendingOp {
    pub fn file_name(&self) -> &str {
        match self {
            Self::Add { file_name, .. } | Self::Delete { file_name } => file_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub op_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub op: PendingOp,
}

pub fn begin(db: &MetadataDb, op: PendingOp) -> Result<JournalEntry, StoreError> {
    if let Some(existing) = pending(db)? {
        return Err(StoreError::Integrity(format!(
            "write {} on {} from {} was never completed; reopen the store to reconcile it",
            existing.op_id,
            existing.op.file_name(),
            existing.started_at.to_rfc3339()
        )));
    }

    let entry = JournalEntry {
        op_id: Uuid::new_v4(),
        started_at: Utc::now(),
        op,
    };
    db.set_meta(JOURNAL_KEY, &serde_json::to_string(&entry)?)?;
    Ok(entry)
}

pub fn pending(db: &MetadataDb) -> Result<Option<JournalEntry>, StoreError> {
    match db.meta(JOURNAL_KEY)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn clear(db: &MetadataDb) -> Result<(), StoreError> {
    db.delete_meta(JOURNAL_KEY)
}
