use async_trait::async_trait;

use crate::domain::client::{Client, ClientId};
use crate::domain::service::{Folio, ServiceRecord};
use crate::errors::ApplicationError;

/// Persistence for service records.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn create(&self, record: &ServiceRecord) -> Result<(), ApplicationError>;
    /// Full overwrite: every mutable part of `record` replaces the stored copy with the same
    /// folio, including fields that were cleared.
    async fn update(&self, record: &ServiceRecord) -> Result<(), ApplicationError>;
    async fn find_by_folio(&self, folio: Folio) -> Result<Option<ServiceRecord>, ApplicationError>;
    async fn list_all(&self) -> Result<Vec<ServiceRecord>, ApplicationError>;
    /// Strictly greater than every stored folio, or the configured base when empty.
    async fn next_folio(&self) -> Result<Folio, ApplicationError>;
}

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn find_client(&self, id: &ClientId) -> Result<Option<Client>, ApplicationError>;
    async fn list_clients(&self) -> Result<Vec<Client>, ApplicationError>;
}
