use std::collections::BTreeMap;

use tokio::sync::RwLock;

use towline_core::domain::client::{Client, ClientId};
use towline_core::domain::service::{Folio, ServiceRecord, DEFAULT_FOLIO_BASE};
use towline_core::errors::ApplicationError;
use towline_core::store::{ClientRegistry, ServiceStore};

use super::{folio_after, RepositoryError};

pub struct InMemoryServiceRepository {
    records: RwLock<BTreeMap<Folio, ServiceRecord>>,
    folio_base: Folio,
}

impl InMemoryServiceRepository {
    pub fn with_folio_base(folio_base: Folio) -> Self {
        Self { records: RwLock::new(BTreeMap::new()), folio_base }
    }
}

impl Default for InMemoryServiceRepository {
    fn default() -> Self {
        Self::with_folio_base(DEFAULT_FOLIO_BASE)
    }
}

#[async_trait::async_trait]
impl ServiceStore for InMemoryServiceRepository {
    async fn create(&self, record: &ServiceRecord) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.folio) {
            return Err(RepositoryError::DuplicateFolio(record.folio).into());
        }
        records.insert(record.folio, record.clone());
        Ok(())
    }

    async fn update(&self, record: &ServiceRecord) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.folio) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(RepositoryError::MissingFolio(record.folio).into()),
        }
    }

    async fn find_by_folio(&self, folio: Folio) -> Result<Option<ServiceRecord>, ApplicationError> {
        let records = self.records.read().await;
        Ok(records.get(&folio).cloned())
    }

    async fn list_all(&self) -> Result<Vec<ServiceRecord>, ApplicationError> {
        let records = self.records.read().await;
        Ok(records.values().rev().cloned().collect())
    }

    async fn next_folio(&self) -> Result<Folio, ApplicationError> {
        let records = self.records.read().await;
        Ok(folio_after(records.keys().next_back().map(|folio| folio.0), self.folio_base))
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<BTreeMap<ClientId, Client>>,
}

impl InMemoryClientRepository {
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: RwLock::new(
                clients.into_iter().map(|client| (client.id.clone(), client)).collect(),
            ),
        }
    }

    pub async fn save(&self, client: Client) {
        let mut clients = self.clients.write().await;
        clients.insert(client.id.clone(), client);
    }
}

#[async_trait::async_trait]
impl ClientRegistry for InMemoryClientRepository {
    async fn find_client(&self, id: &ClientId) -> Result<Option<Client>, ApplicationError> {
        let clients = self.clients.read().await;
        Ok(clients.get(id).cloned())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, ApplicationError> {
        let clients = self.clients.read().await;
        let mut listed: Vec<Client> = clients.values().cloned().collect();
        listed.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use towline_core::domain::client::{Client, ClientId};
    use towline_core::domain::service::{Folio, ServiceRecord, ServiceStatus, ServiceType};
    use towline_core::errors::ApplicationError;
    use towline_core::store::{ClientRegistry, ServiceStore};

    use super::{InMemoryClientRepository, InMemoryServiceRepository};

    fn record(folio: i64) -> ServiceRecord {
        let created_at = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).single().expect("time");
        ServiceRecord::new(Folio(folio), ServiceType::find("llanta").expect("type"), created_at)
    }

    #[tokio::test]
    async fn in_memory_service_repo_round_trip() {
        let repo = InMemoryServiceRepository::default();
        assert_eq!(repo.next_folio().await.expect("next"), Folio(1001));

        let mut stored = record(1001);
        repo.create(&stored).await.expect("create");
        stored.status = ServiceStatus::Assigned;
        repo.update(&stored).await.expect("update");

        assert_eq!(repo.find_by_folio(Folio(1001)).await.expect("find"), Some(stored));
        assert_eq!(repo.next_folio().await.expect("next"), Folio(1002));
    }

    #[tokio::test]
    async fn in_memory_service_repo_rejects_unknown_and_repeated_folios() {
        let repo = InMemoryServiceRepository::with_folio_base(Folio(5000));
        repo.create(&record(5000)).await.expect("create");

        assert!(matches!(
            repo.create(&record(5000)).await,
            Err(ApplicationError::Persistence(_))
        ));
        assert!(matches!(
            repo.update(&record(5001)).await,
            Err(ApplicationError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_client_repo_lists_by_name() {
        let repo = InMemoryClientRepository::with_clients([
            Client {
                id: ClientId("spv".to_string()),
                name: "SPV".to_string(),
                company_id: Some(1),
                rate_card: None,
            },
            Client {
                id: ClientId("ford".to_string()),
                name: "Ford".to_string(),
                company_id: Some(1),
                rate_card: None,
            },
        ]);

        let names: Vec<String> = repo
            .list_clients()
            .await
            .expect("list")
            .into_iter()
            .map(|client| client.name)
            .collect();
        assert_eq!(names, vec!["Ford".to_string(), "SPV".to_string()]);
        assert!(repo.find_client(&ClientId("ike".to_string())).await.expect("find").is_none());
    }
}
