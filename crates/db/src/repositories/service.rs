use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use towline_core::audit::AuditLog;
use towline_core::domain::client::ClientId;
use towline_core::domain::service::{
    Folio, LockState, ServiceCategory, ServiceRecord, ServiceStatus, ServiceStep,
};
use towline_core::errors::ApplicationError;
use towline_core::store::ServiceStore;

use super::{folio_after, RepositoryError};
use crate::DbPool;

pub struct SqlServiceRepository {
    pool: DbPool,
    folio_base: Folio,
}

impl SqlServiceRepository {
    pub fn new(pool: DbPool, folio_base: Folio) -> Self {
        Self { pool, folio_base }
    }

    async fn insert(&self, record: &ServiceRecord) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO service_record (
                folio,
                client_id,
                service_type,
                category,
                step,
                status,
                report_json,
                assignment_json,
                quotation_json,
                timestamps_json,
                report_locked,
                assignment_locked,
                audit_log_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.folio.0)
        .bind(record.client_id.as_ref().map(|id| id.0.as_str()))
        .bind(&record.service_type)
        .bind(record.category.as_str())
        .bind(record.step.as_str())
        .bind(record.status.as_str())
        .bind(encode(&record.report, "report")?)
        .bind(encode(&record.assignment, "assignment")?)
        .bind(record.quotation.as_ref().map(|quotation| encode(quotation, "quotation")).transpose()?)
        .bind(encode(&record.timestamps, "timestamps")?)
        .bind(record.lock_state.report_locked)
        .bind(record.lock_state.assignment_locked)
        .bind(encode(&record.audit_log, "audit log")?)
        .bind(record.created_at.to_rfc3339())
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(event_name = "db.service.created", folio = %record.folio, "service stored");
                Ok(())
            }
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::DuplicateFolio(record.folio))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn overwrite(&self, record: &ServiceRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE service_record SET
                client_id = ?,
                step = ?,
                status = ?,
                report_json = ?,
                assignment_json = ?,
                quotation_json = ?,
                timestamps_json = ?,
                report_locked = ?,
                assignment_locked = ?,
                audit_log_json = ?,
                updated_at = ?
             WHERE folio = ?",
        )
        .bind(record.client_id.as_ref().map(|id| id.0.as_str()))
        .bind(record.step.as_str())
        .bind(record.status.as_str())
        .bind(encode(&record.report, "report")?)
        .bind(encode(&record.assignment, "assignment")?)
        .bind(record.quotation.as_ref().map(|quotation| encode(quotation, "quotation")).transpose()?)
        .bind(encode(&record.timestamps, "timestamps")?)
        .bind(record.lock_state.report_locked)
        .bind(record.lock_state.assignment_locked)
        .bind(encode(&record.audit_log, "audit log")?)
        .bind(Utc::now().to_rfc3339())
        .bind(record.folio.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::MissingFolio(record.folio));
        }
        debug!(event_name = "db.service.updated", folio = %record.folio, "service updated");
        Ok(())
    }

    async fn fetch(&self, folio: Folio) -> Result<Option<ServiceRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                folio,
                client_id,
                service_type,
                category,
                step,
                status,
                report_json,
                assignment_json,
                quotation_json,
                timestamps_json,
                report_locked,
                assignment_locked,
                audit_log_json,
                created_at
             FROM service_record
             WHERE folio = ?",
        )
        .bind(folio.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn fetch_all(&self) -> Result<Vec<ServiceRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                folio,
                client_id,
                service_type,
                category,
                step,
                status,
                report_json,
                assignment_json,
                quotation_json,
                timestamps_json,
                report_locked,
                assignment_locked,
                audit_log_json,
                created_at
             FROM service_record
             ORDER BY folio DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn max_folio(&self) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query("SELECT MAX(folio) AS max_folio FROM service_record")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("max_folio")?)
    }
}

#[async_trait::async_trait]
impl ServiceStore for SqlServiceRepository {
    async fn create(&self, record: &ServiceRecord) -> Result<(), ApplicationError> {
        Ok(self.insert(record).await?)
    }

    async fn update(&self, record: &ServiceRecord) -> Result<(), ApplicationError> {
        Ok(self.overwrite(record).await?)
    }

    async fn find_by_folio(&self, folio: Folio) -> Result<Option<ServiceRecord>, ApplicationError> {
        Ok(self.fetch(folio).await?)
    }

    async fn list_all(&self) -> Result<Vec<ServiceRecord>, ApplicationError> {
        Ok(self.fetch_all().await?)
    }

    async fn next_folio(&self) -> Result<Folio, ApplicationError> {
        Ok(folio_after(self.max_folio().await?, self.folio_base))
    }
}

fn record_from_row(row: SqliteRow) -> Result<ServiceRecord, RepositoryError> {
    let folio = Folio(row.try_get::<i64, _>("folio")?);
    let category = row.try_get::<String, _>("category")?;
    let step = row.try_get::<String, _>("step")?;
    let status = row.try_get::<String, _>("status")?;
    let created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?)?;
    let quotation = row
        .try_get::<Option<String>, _>("quotation_json")?
        .map(|raw| decode(&raw, "quotation"))
        .transpose()?;

    Ok(ServiceRecord {
        folio,
        step: ServiceStep::parse(&step)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step `{step}`")))?,
        status: ServiceStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?,
        client_id: row.try_get::<Option<String>, _>("client_id")?.map(ClientId),
        service_type: row.try_get("service_type")?,
        category: ServiceCategory::parse(&category)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{category}`")))?,
        report: decode(&row.try_get::<String, _>("report_json")?, "report")?,
        assignment: decode(&row.try_get::<String, _>("assignment_json")?, "assignment")?,
        quotation,
        timestamps: decode(&row.try_get::<String, _>("timestamps_json")?, "timestamps")?,
        lock_state: LockState {
            report_locked: row.try_get("report_locked")?,
            assignment_locked: row.try_get("assignment_locked")?,
        },
        audit_log: audit_log_from_text(&row.try_get::<String, _>("audit_log_json")?, created_at),
        created_at,
    })
}

/// Stored logs that are not a JSON array are kept whole as one legacy entry.
fn audit_log_from_text(raw: &str, fallback_time: DateTime<Utc>) -> AuditLog {
    let values = match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values,
        Err(_) if raw.trim().is_empty() => Vec::new(),
        Err(_) => vec![Value::String(raw.to_string())],
    };
    AuditLog::from_stored(&values, fallback_time)
}

fn encode<T: Serialize>(value: &T, what: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Encode(format!("{what}: {error}")))
}

fn decode<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{what}: {error}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("timestamp `{value}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use towline_core::audit::{LogDraft, LogKind, LogPayload};
    use towline_core::domain::client::ClientId;
    use towline_core::domain::service::{
        Folio, RequestReason, ServiceRecord, ServiceStatus, ServiceStep, ServiceType,
    };
    use towline_core::errors::ApplicationError;
    use towline_core::store::ServiceStore;

    use super::SqlServiceRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_record(folio: i64) -> ServiceRecord {
        let created_at = parse_ts("2026-04-12T18:30:00Z");
        let mut record = ServiceRecord::new(
            Folio(folio),
            ServiceType::find("grua").expect("service type"),
            created_at,
        );
        record.client_id = Some(ClientId("ike-asistencia".to_string()));
        record.report.client_name = "IKE asistencia".to_string();
        record.report.vehicle.plates = "ABC123".to_string();
        record.report.request_reason = Some(RequestReason::Accident);
        record.audit_log.append(LogDraft::text(LogKind::Capture, "Service captured").stamp("Ana", created_at));
        record
    }

    #[tokio::test]
    async fn sql_service_repo_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlServiceRepository::new(pool.clone(), Folio(1001));
        let record = sample_record(1001);

        repo.create(&record).await.expect("create");
        let found = repo.find_by_folio(Folio(1001)).await.expect("find");
        assert_eq!(found, Some(record.clone()));

        let mut updated = record.clone();
        updated.status = ServiceStatus::Assigned;
        updated.step = ServiceStep::Monitoring;
        updated.lock_state.report_locked = true;
        updated.timestamps.assignment = Some(parse_ts("2026-04-12T18:45:00Z"));
        updated.report.vehicle.plates.clear();
        updated.report.request_reason = None;
        repo.update(&updated).await.expect("update");

        let found = repo.find_by_folio(Folio(1001)).await.expect("find updated");
        assert_eq!(found.as_ref().map(|found| found.report.request_reason), Some(None));
        assert_eq!(found, Some(updated));

        pool.close().await;
    }

    #[tokio::test]
    async fn next_folio_is_above_the_stored_maximum() {
        let pool = setup_pool().await;
        let repo = SqlServiceRepository::new(pool.clone(), Folio(1001));
        assert_eq!(repo.next_folio().await.expect("empty store"), Folio(1001));

        for folio in [1001, 1002, 1050] {
            repo.create(&sample_record(folio)).await.expect("create");
        }
        assert_eq!(repo.next_folio().await.expect("next"), Folio(1051));

        let listed = repo.list_all().await.expect("list");
        let folios: Vec<i64> = listed.iter().map(|record| record.folio.0).collect();
        assert_eq!(folios, vec![1050, 1002, 1001]);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_and_missing_folios_are_persistence_errors() {
        let pool = setup_pool().await;
        let repo = SqlServiceRepository::new(pool.clone(), Folio(1001));
        let record = sample_record(1001);

        repo.create(&record).await.expect("create");
        let duplicate = repo.create(&record).await.expect_err("duplicate");
        assert!(matches!(duplicate, ApplicationError::Persistence(ref message) if message.contains("already stored")));

        let missing = repo.update(&sample_record(2000)).await.expect_err("missing");
        assert!(matches!(missing, ApplicationError::Persistence(ref message) if message.contains("not stored")));

        pool.close().await;
    }

    #[tokio::test]
    async fn legacy_rows_are_normalised_on_load() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO service_record (
                folio, client_id, service_type, category, step, status, report_json,
                assignment_json, quotation_json, timestamps_json, report_locked,
                assignment_locked, audit_log_json, created_at, updated_at
             ) VALUES (
                1200, NULL, 'grua', 'vehicular', 'monitoring', 'En Camino', '{\"placas\":\"LEG001\"}',
                '{\"grua\":\"G-02\",\"operador\":\"Carlos Ruiz\"}', NULL, '{}', 1, 1, ?,
                '2025-11-02T10:00:00Z', '2025-11-02T10:00:00Z'
             )",
        )
        .bind(
            r#"["Servicio creado", {"usuario":"Ana","accion":"CAMBIO_ESTATUS","detalles":"Asignado -> En Sitio","fecha":1762077600000}]"#,
        )
        .execute(&pool)
        .await
        .expect("insert legacy row");

        let repo = SqlServiceRepository::new(pool.clone(), Folio(1001));
        let record = repo.find_by_folio(Folio(1200)).await.expect("find").expect("stored");

        assert_eq!(record.status, ServiceStatus::Assigned);
        assert_eq!(record.report.vehicle.plates, "LEG001");
        assert_eq!(record.assignment.unit, "G-02");
        let kinds: Vec<LogKind> = record.audit_log.entries().iter().map(|entry| entry.kind).collect();
        assert_eq!(kinds, vec![LogKind::Note, LogKind::StatusChange]);
        assert_eq!(record.audit_log.entries()[1].actor, "Ana");
        assert_eq!(
            record.audit_log.entries()[0].payload,
            LogPayload::Text("Servicio creado".to_string())
        );

        pool.close().await;
    }
}
