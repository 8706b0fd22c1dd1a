//! Embedded SQL schema (§6 "Persisted SQL schema"), one `sea-orm` entity
//! module per table, connected over `sqlx-sqlite`.

pub mod branch_protection;
pub mod bloom_filter;
pub mod compaction_journal;
pub mod compaction_retries;
pub mod hot_objects;
pub mod object_index;
pub mod objects;
pub mod refs;
pub mod sha_cache;
pub mod wal;
pub mod write_buffer_wal;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

use crate::errors::CellError;

/// Open (creating if needed) the cell's embedded SQLite database and ensure
/// every table in the schema exists. `path` is a `sqlite://...` connection
/// string; tests typically use `sqlite::memory:`.
pub async fn connect_and_migrate(path: &str) -> Result<DatabaseConnection, CellError> {
    let db = Database::connect(path).await?;
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    macro_rules! create_table {
        ($entity:path) => {
            db.execute(builder.build(schema.create_table_from_entity($entity).if_not_exists()))
                .await?;
        };
    }

    create_table!(objects::Entity);
    create_table!(object_index::Entity);
    create_table!(hot_objects::Entity);
    create_table!(wal::Entity);
    create_table!(refs::Entity);
    create_table!(branch_protection::Entity);
    create_table!(write_buffer_wal::Entity);
    create_table!(compaction_journal::Entity);
    create_table!(compaction_retries::Entity);
    create_table!(bloom_filter::Entity);
    create_table!(sha_cache::Entity);

    Ok(db)
}
