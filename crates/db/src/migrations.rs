use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Up migrations compiled into the binary.
pub fn embedded_count() -> i64 {
    MIGRATOR.iter().filter(|migration| !migration.migration_type.is_down_migration()).count() as i64
}

/// Successfully applied migrations; zero before the bookkeeping table exists.
pub async fn applied_count(pool: &DbPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{applied_count, embedded_count, run_pending, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    const SCHEMA_OBJECTS: [&str; 5] = [
        "client",
        "idx_client_company_id",
        "idx_service_record_created_at",
        "idx_service_record_status",
        "service_record",
    ];

    async fn memory_pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect")
    }

    /// `(name, type, sql)` of every schema object the migrations own, sorted by name.
    async fn schema(pool: &DbPool) -> Vec<(String, String, String)> {
        let rows = sqlx::query(
            "SELECT name, type, IFNULL(sql, '') AS sql FROM sqlite_master
             WHERE type IN ('table', 'index') ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("read sqlite_master");

        rows.into_iter()
            .map(|row| {
                (row.get::<String, _>("name"), row.get::<String, _>("type"), row.get::<String, _>("sql"))
            })
            .filter(|(name, _, _)| SCHEMA_OBJECTS.contains(&name.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn baseline_creates_every_schema_object() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("migrate");

        let names: Vec<String> = schema(&pool).await.into_iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, SCHEMA_OBJECTS);
    }

    #[tokio::test]
    async fn applied_count_reaches_the_embedded_count() {
        let pool = memory_pool().await;
        assert_eq!(applied_count(&pool).await, 0);

        run_pending(&pool).await.expect("migrate");
        assert_eq!(applied_count(&pool).await, embedded_count());
        assert!(embedded_count() >= 1);
    }

    #[tokio::test]
    async fn undo_then_redo_restores_the_same_schema() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("migrate");
        let migrated = schema(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo");
        assert!(schema(&pool).await.is_empty(), "down migrations drop every object");

        run_pending(&pool).await.expect("migrate again");
        assert_eq!(schema(&pool).await, migrated);
    }
}
