use thiserror::Error;

use towline_core::domain::service::Folio;
use towline_core::errors::ApplicationError;

pub mod client;
pub mod memory;
pub mod service;

pub use client::SqlClientRepository;
pub use memory::{InMemoryClientRepository, InMemoryServiceRepository};
pub use service::SqlServiceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("service {0} is already stored")]
    DuplicateFolio(Folio),
    #[error("service {0} is not stored")]
    MissingFolio(Folio),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Next folio after `max_stored`, or `base` for an empty store.
pub fn folio_after(max_stored: Option<i64>, base: Folio) -> Folio {
    match max_stored {
        Some(max) => Folio(max).next(),
        None => base,
    }
}
