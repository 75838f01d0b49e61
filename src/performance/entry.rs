//! Cache entries and their on-disk records.

use crate::analysis::AnalysisResult;
use crate::ast::ParsedTree;
use crate::errors::Result;
use crate::performance::fingerprint::{now_secs, FileFingerprint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What an entry holds. Both variants are shared, so handing a payload out
/// never copies the tree or the result.
#[derive(Debug, Clone)]
pub enum Payload {
    Tree(Arc<ParsedTree>),
    Result(Arc<AnalysisResult>),
}

impl Payload {
    pub fn as_tree(&self) -> Option<&Arc<ParsedTree>> {
        match self {
            Payload::Tree(tree) => Some(tree),
            Payload::Result(_) => None,
        }
    }

    pub fn as_result(&self) -> Option<&Arc<AnalysisResult>> {
        match self {
            Payload::Result(result) => Some(result),
            Payload::Tree(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Tree(_) => "tree",
            Payload::Result(_) => "result",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Payload,
    pub fingerprint: FileFingerprint,
    pub created_at: f64,
    pub accessed_at: f64,
    pub access_count: u64,
    pub compute_duration_ms: f64,
    pub size_bytes: usize,
    /// Store-local logical clock value of the last insert or hit. Orders
    /// entries whose timestamps tie.
    pub(crate) touched: u64,
    /// Whether the disk copy reflects this entry.
    pub(crate) persisted: bool,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        payload: Payload,
        fingerprint: FileFingerprint,
        compute_duration_ms: f64,
    ) -> Self {
        let now = now_secs();
        Self::with_times(key, payload, fingerprint, compute_duration_ms, now, now, 0)
    }

    /// Build an entry with explicit timestamps and access count.
    pub fn with_times(
        key: impl Into<String>,
        payload: Payload,
        fingerprint: FileFingerprint,
        compute_duration_ms: f64,
        created_at: f64,
        accessed_at: f64,
        access_count: u64,
    ) -> Self {
        let mut entry = Self {
            key: key.into(),
            payload,
            fingerprint,
            created_at,
            accessed_at: accessed_at.max(created_at),
            access_count,
            compute_duration_ms,
            size_bytes: 0,
            touched: 0,
            persisted: false,
        };
        entry.size_bytes = entry.estimate_size();
        entry
    }

    pub(crate) fn record(&self) -> EntryRecordRef<'_> {
        EntryRecordRef {
            key: &self.key,
            fingerprint: &self.fingerprint,
            created_at: self.created_at,
            accessed_at: self.accessed_at,
            access_count: self.access_count,
            compute_duration_ms: self.compute_duration_ms,
            payload: match &self.payload {
                Payload::Tree(tree) => PayloadRecordRef::Tree {
                    source: tree.source(),
                },
                Payload::Result(result) => PayloadRecordRef::Result { result },
            },
        }
    }

    /// Serialized size of the entry's record, plus the key.
    fn estimate_size(&self) -> usize {
        let record = self.record();
        match bincode::serialized_size(&record) {
            Ok(size) => size as usize,
            Err(_) => self.key.len() + std::mem::size_of::<Self>(),
        }
    }

    pub(crate) fn touch(&mut self, clock: u64) {
        self.accessed_at = now_secs().max(self.created_at);
        self.access_count += 1;
        self.touched = clock;
        self.persisted = false;
    }
}

/// Borrowed on-disk form of an entry.
#[derive(Serialize)]
pub(crate) struct EntryRecordRef<'a> {
    pub key: &'a str,
    pub fingerprint: &'a FileFingerprint,
    pub created_at: f64,
    pub accessed_at: f64,
    pub access_count: u64,
    pub compute_duration_ms: f64,
    pub payload: PayloadRecordRef<'a>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum PayloadRecordRef<'a> {
    Tree { source: &'a str },
    Result { result: &'a AnalysisResult },
}

/// Owned on-disk form of an entry, as read back.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryRecord {
    pub key: String,
    pub fingerprint: FileFingerprint,
    pub created_at: f64,
    pub accessed_at: f64,
    pub access_count: u64,
    pub compute_duration_ms: f64,
    pub payload: PayloadRecord,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum PayloadRecord {
    Tree { source: String },
    Result { result: AnalysisResult },
}

impl EntryRecord {
    /// Rebuild the entry. Trees are parsed again from their stored source.
    pub fn into_entry(self) -> Result<CacheEntry> {
        let payload = match self.payload {
            PayloadRecord::Tree { source } => {
                Payload::Tree(Arc::new(ParsedTree::parse(source, &self.fingerprint.path)?))
            }
            PayloadRecord::Result { result } => Payload::Result(Arc::new(result)),
        };
        let mut entry = CacheEntry::with_times(
            self.key,
            payload,
            self.fingerprint,
            self.compute_duration_ms,
            self.created_at,
            self.accessed_at,
            self.access_count,
        );
        entry.persisted = true;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> FileFingerprint {
        FileFingerprint {
            path: "/project/a.py".to_string(),
            mtime: 10.0,
            size: 12,
        }
    }

    #[test]
    fn test_tree_record_rebuilds_tree() {
        let tree = ParsedTree::parse("def f(a):\n    return a\n", "/project/a.py").unwrap();
        let entry = CacheEntry::new("k", Payload::Tree(Arc::new(tree)), fingerprint(), 2.5);
        assert!(entry.size_bytes > 0);
        assert!(entry.accessed_at >= entry.created_at);

        let json = serde_json::to_vec(&entry.record()).unwrap();
        let record: EntryRecord = serde_json::from_slice(&json).unwrap();
        let restored = record.into_entry().unwrap();

        let tree = restored.payload.as_tree().unwrap();
        assert_eq!(tree.root().children().len(), 1);
        assert_eq!(restored.compute_duration_ms, 2.5);
        assert!(restored.persisted);
    }

    #[test]
    fn test_result_record_shape() {
        let result = AnalysisResult::from_violations("/project/a.py", Vec::new());
        let entry = CacheEntry::new("k", Payload::Result(Arc::new(result)), fingerprint(), 1.0);

        let value = serde_json::to_value(entry.record()).unwrap();
        assert_eq!(value["payload"]["kind"], "result");
        assert_eq!(value["fingerprint"]["size"], 12);
    }

    #[test]
    fn test_accessed_never_precedes_created() {
        let result = Arc::new(AnalysisResult::default());
        let entry = CacheEntry::with_times("k", Payload::Result(result), fingerprint(), 0.0, 50.0, 20.0, 0);
        assert_eq!(entry.accessed_at, 50.0);
    }
}
