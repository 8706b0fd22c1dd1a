//! Write-ahead buffered columnar exporter (§4.3): every accepted object is
//! WAL-logged immediately, then flushed into an append-only segment, then
//! periodically compacted. Compaction is deferred to the alarm loop
//! (`runtime::scheduler`); this module only implements the mechanics.

pub mod bloom;
pub mod journal;
pub mod segment;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tokio::sync::Mutex;

use crate::bulk_store::{BulkStore, ListOptions};
use crate::capabilities::{Clock, RandomId};
use crate::config::ColumnarConfig;
use crate::errors::CellError;
use crate::schema::write_buffer_wal;

use bloom::BloomFilter;
use segment::{ColumnarSegment, SegmentCodec, SegmentRow};

pub struct ColumnarExporter {
    db: DatabaseConnection,
    bulk: Arc<dyn BulkStore>,
    prefix: String,
    config: ColumnarConfig,
    buffer: Mutex<Vec<(i64, SegmentRow)>>,
    bloom: Mutex<BloomFilter>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomId>,
}

impl ColumnarExporter {
    pub fn new(
        db: DatabaseConnection,
        bulk: Arc<dyn BulkStore>,
        prefix: impl Into<String>,
        config: ColumnarConfig,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomId>,
    ) -> Self {
        ColumnarExporter {
            db,
            bulk,
            prefix: prefix.into(),
            config,
            buffer: Mutex::new(Vec::new()),
            bloom: Mutex::new(BloomFilter::new(4096, 0.01)),
            clock,
            random,
        }
    }

    /// §4.3 `accept`: durably WAL-log, then buffer. If the soft cap is
    /// exceeded, flush inline before returning (back-pressure, §5).
    pub async fn accept(&self, sha: &str, object_type: &str, data: Vec<u8>) -> Result<(), CellError> {
        let now = Utc::now();
        let row = write_buffer_wal::ActiveModel {
            sha: Set(sha.to_string()),
            r#type: Set(object_type.to_string()),
            data: Set(data.clone()),
            path: Set(None),
            created_at: Set(now),
            ..Default::default()
        };
        let inserted = row.insert(&self.db).await?;

        let segment_row = SegmentRow {
            sha: sha.to_string(),
            object_type: object_type.to_string(),
            size: data.len() as i64,
            payload: data,
            ts: self.clock.now_millis(),
        };

        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push((inserted.id, segment_row));
            buffer.len() >= self.config.buffer_soft_cap
        };

        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// §4.3 `flush`: drains the buffer into one time-ordered segment; marks
    /// the corresponding WAL rows flushed and updates the bloom filter.
    pub async fn flush(&self) -> Result<Option<String>, CellError> {
        let drained: Vec<(i64, SegmentRow)> = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if drained.is_empty() {
            return Ok(None);
        }

        let key = ColumnarSegment::new_key(
            &self.prefix,
            self.clock.now_millis(),
            SegmentCodec::Uncompressed,
            &self.random.new_id(),
        );
        let rows: Vec<SegmentRow> = drained.iter().map(|(_, row)| row.clone()).collect();
        let segment = ColumnarSegment::new(key.clone(), SegmentCodec::Uncompressed, rows);
        self.bulk.put(&key, segment.to_bytes()?).await?;

        {
            let mut bloom = self.bloom.lock().await;
            for (_, row) in &drained {
                bloom.insert(&row.sha);
            }
        }

        for (wal_id, _) in &drained {
            if let Some(wal_row) = write_buffer_wal::Entity::find_by_id(*wal_id).one(&self.db).await? {
                write_buffer_wal::Entity::delete_by_id(wal_row.id).exec(&self.db).await?;
            }
        }

        Ok(Some(key))
    }

    /// Approximate membership check against the in-memory bloom filter.
    pub async fn might_contain(&self, sha: &str) -> bool {
        self.bloom.lock().await.might_contain(sha)
    }

    /// Whether enough small segments have accumulated to warrant a
    /// timer-driven compaction pass.
    pub async fn compaction_needed(&self) -> Result<bool, CellError> {
        let listing = self
            .bulk
            .list(ListOptions {
                prefix: Some(format!("{}/segments/", self.prefix)),
                ..Default::default()
            })
            .await?;
        Ok(listing.objects.len() >= self.config.compaction_batch_size)
    }

    /// §4.3 `compact`: merge the oldest batch of segments (deduplicating by
    /// sha) into one, journaled for crash safety. Never called inline —
    /// the alarm loop invokes this with the retry/back-off policy.
    pub async fn compact(&self) -> Result<Option<String>, CellError> {
        let listing = self
            .bulk
            .list(ListOptions {
                prefix: Some(format!("{}/segments/", self.prefix)),
                limit: Some(self.config.compaction_batch_size),
                ..Default::default()
            })
            .await?;
        if listing.objects.len() < 2 {
            return Ok(None);
        }

        let mut segments = Vec::with_capacity(listing.objects.len());
        for key in &listing.objects {
            if let Some(obj) = self.bulk.get(key).await? {
                segments.push(ColumnarSegment::from_bytes(&obj.data)?);
            }
        }

        let target_key = ColumnarSegment::new_key(
            &self.prefix,
            self.clock.now_millis(),
            SegmentCodec::Uncompressed,
            &self.random.new_id(),
        );
        let journal_id = journal::begin_compaction(&self.db, &listing.objects, &target_key).await?;

        let merged = ColumnarSegment::merge(target_key.clone(), SegmentCodec::Uncompressed, &segments);
        self.bulk.put(&target_key, merged.to_bytes()?).await?;
        journal::mark_written(&self.db, journal_id).await?;

        self.bulk.delete(&listing.objects).await?;
        journal::mark_committed(&self.db, journal_id).await?;
        journal::clear_retries(&self.db).await?;

        Ok(Some(target_key))
    }

    /// Run compaction applying the exponential back-off and max-attempts
    /// policy; permanently skips after `max_attempts` until an explicit
    /// `scheduleCompaction()` (caller calling `journal::clear_retries`).
    pub async fn run_compaction_if_needed(&self) -> Result<(), CellError> {
        if !self.compaction_needed().await? {
            return Ok(());
        }
        let attempts = journal::current_attempt_count(&self.db).await?;
        if attempts >= self.config.max_attempts as i32 {
            tracing::warn!(attempts, "compaction permanently skipped after max attempts");
            return Ok(());
        }

        match self.compact().await {
            Ok(_) => Ok(()),
            Err(e) => {
                journal::record_failure(&self.db, &e.to_string()).await?;
                tracing::warn!(error = %e, "compaction attempt failed, backing off");
                Ok(())
            }
        }
    }

    /// Delay before the alarm loop's next tick: the normal cadence, unless
    /// the previous attempt failed and hasn't exhausted `max_attempts`, in
    /// which case it's `backoff_secs(attempt)` (§4.3, §5 back-pressure).
    pub async fn next_alarm_delay(&self, normal_interval: Duration) -> Result<Duration, CellError> {
        let attempts = journal::current_attempt_count(&self.db).await?;
        if attempts <= 0 || attempts as u32 >= self.config.max_attempts {
            return Ok(normal_interval);
        }
        let backoff = journal::backoff_secs(self.config.retry_base_secs, self.config.retry_multiplier, attempts);
        Ok(Duration::from_secs(backoff))
    }

    /// §4.3 crash recovery: replay unflushed buffer rows, and delete any
    /// partially-written compaction target left from an interrupted run.
    pub async fn recover(&self) -> Result<(), CellError> {
        let unflushed = write_buffer_wal::Entity::find().all(&self.db).await?;
        let mut buffer = self.buffer.lock().await;
        for row in unflushed {
            buffer.push((
                row.id,
                SegmentRow {
                    sha: row.sha,
                    object_type: row.r#type,
                    size: row.data.len() as i64,
                    payload: row.data,
                    ts: row.created_at.timestamp_millis(),
                },
            ));
        }
        drop(buffer);

        for journal_row in journal::find_in_progress(&self.db).await? {
            if self.bulk.head(&journal_row.target_key).await? {
                self.bulk.delete(&[journal_row.target_key]).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::capabilities::{SystemClock, UuidV4RandomId};

    async fn test_exporter() -> ColumnarExporter {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let bulk = Arc::new(MemoryBulkStore::new());
        ColumnarExporter::new(
            db,
            bulk,
            "test",
            ColumnarConfig {
                buffer_soft_cap: 2,
                compaction_batch_size: 2,
                ..ColumnarConfig::default()
            },
            Arc::new(SystemClock),
            Arc::new(UuidV4RandomId),
        )
    }

    #[tokio::test]
    async fn accept_then_flush_writes_a_segment() {
        let exporter = test_exporter().await;
        exporter.accept("sha1", "blob", b"a".to_vec()).await.unwrap();
        let key = exporter.flush().await.unwrap().unwrap();
        assert!(exporter.bulk.get(&key).await.unwrap().is_some());
        assert!(exporter.might_contain("sha1").await);
    }

    #[tokio::test]
    async fn accept_past_soft_cap_flushes_automatically() {
        let exporter = test_exporter().await;
        exporter.accept("a", "blob", b"1".to_vec()).await.unwrap();
        exporter.accept("b", "blob", b"2".to_vec()).await.unwrap();
        // soft cap is 2; the second accept should have triggered an inline flush
        let buffer = exporter.buffer.lock().await;
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn compact_merges_and_deduplicates_segments() {
        let exporter = test_exporter().await;
        exporter.accept("a", "blob", b"1".to_vec()).await.unwrap();
        exporter.flush().await.unwrap();
        exporter.accept("a", "blob", b"1".to_vec()).await.unwrap();
        exporter.accept("b", "blob", b"2".to_vec()).await.unwrap();
        exporter.flush().await.unwrap();

        assert!(exporter.compaction_needed().await.unwrap());
        let merged_key = exporter.compact().await.unwrap().unwrap();
        let merged = ColumnarSegment::from_bytes(&exporter.bulk.get(&merged_key).await.unwrap().unwrap().data).unwrap();
        let shas: std::collections::HashSet<_> = merged.rows.iter().map(|r| r.sha.clone()).collect();
        assert_eq!(shas.len(), 2);
    }

    #[tokio::test]
    async fn alarm_delay_backs_off_exponentially_after_failures() {
        let exporter = test_exporter().await;
        let normal = std::time::Duration::from_secs(5);
        assert_eq!(exporter.next_alarm_delay(normal).await.unwrap(), normal);

        journal::record_failure(&exporter.db, "boom").await.unwrap();
        assert_eq!(exporter.next_alarm_delay(normal).await.unwrap(), std::time::Duration::from_secs(10));

        journal::record_failure(&exporter.db, "boom again").await.unwrap();
        assert_eq!(exporter.next_alarm_delay(normal).await.unwrap(), std::time::Duration::from_secs(30));

        // at max_attempts (3 by default), the alarm reverts to normal cadence
        // since compaction is permanently skipped until an explicit reset.
        journal::record_failure(&exporter.db, "boom a third time").await.unwrap();
        assert_eq!(exporter.next_alarm_delay(normal).await.unwrap(), normal);
    }

    #[tokio::test]
    async fn recover_replays_unflushed_buffer_rows() {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let bulk: Arc<dyn BulkStore> = Arc::new(MemoryBulkStore::new());
        let row = write_buffer_wal::ActiveModel {
            sha: Set("crash-sha".into()),
            r#type: Set("blob".into()),
            data: Set(b"data".to_vec()),
            path: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        row.insert(&db).await.unwrap();

        let exporter = ColumnarExporter::new(
            db,
            bulk,
            "test",
            ColumnarConfig::default(),
            Arc::new(SystemClock),
            Arc::new(UuidV4RandomId),
        );
        exporter.recover().await.unwrap();
        let buffer = exporter.buffer.lock().await;
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer[0].1.sha, "crash-sha");
    }
}
