//! Append-only immutable columnar segments (§3, §6 "Columnar segment
//! contents"). One segment covers a batch of `WriteBufferEntry` rows,
//! column-encoded with the requested codec.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentCodec {
    Snappy,
    Lz4,
    Lz4Raw,
    Uncompressed,
}

impl SegmentCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentCodec::Snappy => "SNAPPY",
            SegmentCodec::Lz4 => "LZ4",
            SegmentCodec::Lz4Raw => "LZ4_RAW",
            SegmentCodec::Uncompressed => "UNCOMPRESSED",
        }
    }
}

/// One row of the object-export column set `(sha, type, size, payload, ts)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRow {
    pub sha: String,
    pub object_type: String,
    pub size: i64,
    pub payload: Vec<u8>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnarSegment {
    pub key: String,
    pub codec: SegmentCodec,
    pub rows: Vec<SegmentRow>,
}

impl ColumnarSegment {
    /// Time-ordered key: `<prefix>/segments/<ts>-<uuid>.<ext>` (§6).
    pub fn new_key(prefix: &str, now_millis: i64, codec: SegmentCodec, random_id: &str) -> String {
        let ext = match codec {
            SegmentCodec::Uncompressed => "bin",
            _ => "seg",
        };
        format!("{prefix}/segments/{now_millis}-{random_id}.{ext}")
    }

    pub fn new(key: String, codec: SegmentCodec, rows: Vec<SegmentRow>) -> Self {
        ColumnarSegment { key, codec, rows }
    }

    /// Deduplicating merge of multiple segments by sha, keeping the first
    /// occurrence encountered (source segments are time-ordered).
    pub fn merge(target_key: String, codec: SegmentCodec, segments: &[ColumnarSegment]) -> ColumnarSegment {
        let mut seen = std::collections::HashSet::new();
        let mut rows = Vec::new();
        for segment in segments {
            for row in &segment.rows {
                if seen.insert(row.sha.clone()) {
                    rows.push(row.clone());
                }
            }
        }
        ColumnarSegment::new(target_key, codec, rows)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CellError> {
        serde_json::to_vec(self).map_err(|e| CellError::Io(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CellError> {
        serde_json::from_slice(data).map_err(|e| CellError::malformed(0, e.to_string()))
    }
}

pub fn new_random_segment_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sha: &str) -> SegmentRow {
        SegmentRow {
            sha: sha.to_string(),
            object_type: "blob".to_string(),
            size: 4,
            payload: b"data".to_vec(),
            ts: 1,
        }
    }

    #[test]
    fn merge_deduplicates_by_sha() {
        let a = ColumnarSegment::new("a".into(), SegmentCodec::Uncompressed, vec![row("x"), row("y")]);
        let b = ColumnarSegment::new("b".into(), SegmentCodec::Uncompressed, vec![row("y"), row("z")]);
        let merged = ColumnarSegment::merge("merged".into(), SegmentCodec::Uncompressed, &[a, b]);
        let shas: Vec<_> = merged.rows.iter().map(|r| r.sha.as_str()).collect();
        assert_eq!(shas, vec!["x", "y", "z"]);
    }

    #[test]
    fn round_trips_through_bytes() {
        let segment = ColumnarSegment::new("k".into(), SegmentCodec::Lz4, vec![row("x")]);
        let bytes = segment.to_bytes().unwrap();
        let parsed = ColumnarSegment::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.codec, SegmentCodec::Lz4);
    }
}
