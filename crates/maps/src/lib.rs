//! HTTP map collaborators: driving routes from an OSRM-compatible router and reverse geocoding
//! from a Nominatim-compatible service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use towline_core::config::MapsConfig;
use towline_core::domain::service::RouteLeg;
use towline_core::errors::ApplicationError;
use towline_core::logistics::{AddressComponents, Coordinate, Geocoder, RouteEstimator};

pub mod geocode;
pub mod route;

pub use geocode::HttpGeocoder;
pub use route::HttpRouteEstimator;

const USER_AGENT: &str = concat!("towline/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum MapsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no route: {0}")]
    NoRoute(String),
    #[error("no address: {0}")]
    NoAddress(String),
    #[error("map lookups are disabled")]
    Disabled,
}

impl From<MapsError> for ApplicationError {
    fn from(error: MapsError) -> Self {
        ApplicationError::EstimationUnavailable(error.to_string())
    }
}

/// Route estimator and geocoder pair shared by every session.
#[derive(Clone)]
pub struct MapServices {
    pub routes: Arc<dyn RouteEstimator>,
    pub geocoder: Arc<dyn Geocoder>,
}

impl MapServices {
    pub fn from_config(config: &MapsConfig) -> Result<Self, MapsError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let client = build_client(config)?;
        Ok(Self {
            routes: Arc::new(HttpRouteEstimator::new(client.clone(), config)),
            geocoder: Arc::new(HttpGeocoder::new(client, config)),
        })
    }

    pub fn disabled() -> Self {
        Self { routes: Arc::new(DisabledMaps), geocoder: Arc::new(DisabledMaps) }
    }
}

pub fn build_client(config: &MapsConfig) -> Result<reqwest::Client, MapsError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(USER_AGENT)
        .build()?)
}

/// Answers every lookup as unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledMaps;

#[async_trait]
impl RouteEstimator for DisabledMaps {
    async fn estimate_route(
        &self,
        _origin: Coordinate,
        _destination: Coordinate,
    ) -> Result<RouteLeg, ApplicationError> {
        Err(MapsError::Disabled.into())
    }
}

#[async_trait]
impl Geocoder for DisabledMaps {
    async fn reverse_geocode(
        &self,
        _coordinate: Coordinate,
    ) -> Result<AddressComponents, ApplicationError> {
        Err(MapsError::Disabled.into())
    }
}

pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, MapsError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(MapsError::Server { status: status.as_u16(), body });
    }
    Ok(body)
}
