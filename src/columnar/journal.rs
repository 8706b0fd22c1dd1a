//! Crash-safe compaction bookkeeping backed by the `compaction_journal` and
//! `compaction_retries` tables (§4.3).

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::errors::CellError;
use crate::schema::{compaction_journal, compaction_retries};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalStatus {
    Pending,
    Written,
    Committed,
}

impl JournalStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Pending => "pending",
            JournalStatus::Written => "written",
            JournalStatus::Committed => "committed",
        }
    }
}

/// Record `(sourceKeys, targetKey, status=pending)` before writing the
/// merged segment, so a crash mid-compaction is recoverable.
pub async fn begin_compaction(
    db: &DatabaseConnection,
    source_keys: &[String],
    target_key: &str,
) -> Result<i64, CellError> {
    let row = compaction_journal::ActiveModel {
        source_keys: Set(serde_json::to_string(source_keys).unwrap_or_default()),
        target_key: Set(target_key.to_string()),
        status: Set(JournalStatus::Pending.as_str().to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let inserted = row.insert(db).await?;
    Ok(inserted.id)
}

pub async fn mark_written(db: &DatabaseConnection, id: i64) -> Result<(), CellError> {
    update_status(db, id, JournalStatus::Written).await
}

pub async fn mark_committed(db: &DatabaseConnection, id: i64) -> Result<(), CellError> {
    update_status(db, id, JournalStatus::Committed).await
}

async fn update_status(db: &DatabaseConnection, id: i64, status: JournalStatus) -> Result<(), CellError> {
    if let Some(row) = compaction_journal::Entity::find_by_id(id).one(db).await? {
        let mut active: compaction_journal::ActiveModel = row.into();
        active.status = Set(status.as_str().to_string());
        active.update(db).await?;
    }
    Ok(())
}

/// On startup: any row still `pending`/`written` means a crash happened
/// mid-compaction. The target may be a partial write and must be deleted;
/// the sources remain authoritative and untouched.
pub async fn find_in_progress(db: &DatabaseConnection) -> Result<Vec<compaction_journal::Model>, CellError> {
    let rows = compaction_journal::Entity::find()
        .filter(compaction_journal::Column::Status.ne(JournalStatus::Committed.as_str()))
        .all(db)
        .await?;
    Ok(rows)
}

pub async fn current_attempt_count(db: &DatabaseConnection) -> Result<i32, CellError> {
    Ok(compaction_retries::Entity::find_by_id(1)
        .one(db)
        .await?
        .map(|row| row.attempt_count)
        .unwrap_or(0))
}

pub async fn record_failure(db: &DatabaseConnection, error: &str) -> Result<i32, CellError> {
    let existing = compaction_retries::Entity::find_by_id(1).one(db).await?;
    let next_count = existing.as_ref().map(|row| row.attempt_count + 1).unwrap_or(1);
    let active = compaction_retries::ActiveModel {
        id: Set(1),
        attempt_count: Set(next_count),
        last_error: Set(Some(error.to_string())),
        updated_at: Set(Utc::now()),
    };
    match existing {
        Some(_) => {
            active.update(db).await?;
        }
        None => {
            active.insert(db).await?;
        }
    }
    Ok(next_count)
}

pub async fn clear_retries(db: &DatabaseConnection) -> Result<(), CellError> {
    compaction_retries::Entity::delete_by_id(1).exec(db).await?;
    Ok(())
}

/// Back-off delay for the given attempt number (1-based), per §4.3's
/// `base * multiplier^(attempt-1)`.
pub fn backoff_secs(base: u64, multiplier: f64, attempt: i32) -> u64 {
    (base as f64 * multiplier.powi((attempt - 1).max(0))).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_matches_documented_defaults() {
        assert_eq!(backoff_secs(10, 3.0, 1), 10);
        assert_eq!(backoff_secs(10, 3.0, 2), 30);
        assert_eq!(backoff_secs(10, 3.0, 3), 90);
    }

    #[tokio::test]
    async fn journal_round_trip() {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let id = begin_compaction(&db, &["a".to_string(), "b".to_string()], "merged").await.unwrap();
        mark_written(&db, id).await.unwrap();
        let in_progress = find_in_progress(&db).await.unwrap();
        assert_eq!(in_progress.len(), 1);
        mark_committed(&db, id).await.unwrap();
        assert!(find_in_progress(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_counter_increments_and_clears() {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        assert_eq!(current_attempt_count(&db).await.unwrap(), 0);
        assert_eq!(record_failure(&db, "boom").await.unwrap(), 1);
        assert_eq!(record_failure(&db, "boom again").await.unwrap(), 2);
        clear_retries(&db).await.unwrap();
        assert_eq!(current_attempt_count(&db).await.unwrap(), 0);
    }
}
