use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use towline_core::config::MapsConfig;
use towline_core::domain::service::RouteLeg;
use towline_core::errors::ApplicationError;
use towline_core::logistics::{round_km, Coordinate, RouteEstimator};

use crate::{read_body, MapsError};

/// Driving distance and time from an OSRM-compatible `route/v1/driving` endpoint.
pub struct HttpRouteEstimator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<RouteSummary>,
}

#[derive(Debug, Deserialize)]
struct RouteSummary {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
}

impl HttpRouteEstimator {
    pub fn new(client: reqwest::Client, config: &MapsConfig) -> Self {
        Self {
            client,
            base_url: config.route_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}",
            self.base_url, origin.lng, origin.lat, destination.lng, destination.lat
        )
    }

    async fn fetch(&self, origin: Coordinate, destination: Coordinate) -> Result<RouteLeg, MapsError> {
        let url = self.route_url(origin, destination);
        let mut request = self.client.get(&url).query(&[("overview", "false")]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.expose_secret())]);
        }

        debug!(event_name = "maps.route.request", url = %url, "requesting route");
        let body = read_body(request.send().await?).await?;
        parse_route(&body)
    }
}

#[async_trait]
impl RouteEstimator for HttpRouteEstimator {
    async fn estimate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteLeg, ApplicationError> {
        self.fetch(origin, destination).await.map_err(|error| {
            warn!(event_name = "maps.route.unavailable", error = %error, "route estimate failed");
            error.into()
        })
    }
}

/// First route of a router response, with distance in km to one decimal and duration in whole
/// minutes.
pub fn parse_route(body: &str) -> Result<RouteLeg, MapsError> {
    let response: RouteResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        let detail = response.message.unwrap_or_default();
        return Err(MapsError::NoRoute(format!("{} {}", response.code, detail).trim().to_string()));
    }
    let route = response
        .routes
        .first()
        .ok_or_else(|| MapsError::NoRoute("router answered without routes".to_string()))?;
    if !route.distance.is_finite() || route.distance < 0.0 || !route.duration.is_finite() || route.duration < 0.0 {
        return Err(MapsError::NoRoute("router answered a negative or invalid leg".to_string()));
    }

    let distance_km = Decimal::from_f64(route.distance / 1000.0)
        .map(round_km)
        .ok_or_else(|| MapsError::NoRoute(format!("distance {} is not representable", route.distance)))?;
    let duration_min = (route.duration / 60.0).round().min(f64::from(u32::MAX)) as u32;

    Ok(RouteLeg { distance_km, duration_min })
}
