use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use towline_core::domain::client::{Client, ClientId, RateCard};
use towline_core::errors::ApplicationError;
use towline_core::store::ClientRegistry;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a client by id.
    pub async fn save(&self, client: &Client) -> Result<(), RepositoryError> {
        let rate_card = client
            .rate_card
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Encode(format!("rate card: {error}")))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO client (id, name, company_id, rate_card_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                company_id = excluded.company_id,
                rate_card_json = excluded.rate_card_json,
                updated_at = excluded.updated_at",
        )
        .bind(&client.id.0)
        .bind(&client.name)
        .bind(client.company_id)
        .bind(rate_card)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(event_name = "db.client.saved", client_id = %client.id, "client stored");
        Ok(())
    }

    pub async fn find(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, company_id, rate_card_json FROM client WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(client_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, company_id, rate_card_json FROM client ORDER BY name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(client_from_row).collect()
    }
}

#[async_trait::async_trait]
impl ClientRegistry for SqlClientRepository {
    async fn find_client(&self, id: &ClientId) -> Result<Option<Client>, ApplicationError> {
        Ok(self.find(id).await?)
    }

    async fn list_clients(&self) -> Result<Vec<Client>, ApplicationError> {
        Ok(self.list().await?)
    }
}

fn client_from_row(row: SqliteRow) -> Result<Client, RepositoryError> {
    let rate_card = row
        .try_get::<Option<String>, _>("rate_card_json")?
        .map(|raw| serde_json::from_str::<RateCard>(&raw))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("rate card: {error}")))?;

    Ok(Client {
        id: ClientId(row.try_get("id")?),
        name: row.try_get("name")?,
        company_id: row.try_get("company_id")?,
        rate_card,
    })
}
