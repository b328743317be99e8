use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use towline_core::config::MapsConfig;
use towline_core::errors::ApplicationError;
use towline_core::logistics::{AddressComponents, Coordinate, Geocoder};

use crate::{read_body, MapsError};

/// Reverse geocoding against a Nominatim-compatible `reverse` endpoint.
pub struct HttpGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    address: Option<ReverseAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReverseAddress {
    road: Option<String>,
    house_number: Option<String>,
    neighbourhood: Option<String>,
    suburb: Option<String>,
    quarter: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
}

impl HttpGeocoder {
    pub fn new(client: reqwest::Client, config: &MapsConfig) -> Self {
        Self {
            client,
            base_url: config.geocode_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn fetch(&self, coordinate: Coordinate) -> Result<AddressComponents, MapsError> {
        let url = format!("{}/reverse", self.base_url);
        let lat = format!("{:.6}", coordinate.lat);
        let lon = format!("{:.6}", coordinate.lng);
        let mut request = self.client.get(&url).query(&[
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.expose_secret())]);
        }

        debug!(event_name = "maps.geocode.request", url = %url, lat = %lat, lon = %lon, "reverse geocoding");
        let body = read_body(request.send().await?).await?;
        parse_reverse(&body)
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> Result<AddressComponents, ApplicationError> {
        self.fetch(coordinate).await.map_err(|error| {
            warn!(event_name = "maps.geocode.unavailable", error = %error, "reverse geocoding failed");
            error.into()
        })
    }
}

/// Maps a reverse-geocoding answer onto the address fields of a location.
pub fn parse_reverse(body: &str) -> Result<AddressComponents, MapsError> {
    let response: ReverseResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(MapsError::NoAddress(error));
    }
    let address =
        response.address.ok_or_else(|| MapsError::NoAddress("answer has no address".to_string()))?;

    let street = match (first(&[&address.road]), first(&[&address.house_number])) {
        (road, number) if number.is_empty() => road,
        (road, number) if road.is_empty() => number,
        (road, number) => format!("{road} {number}"),
    };

    Ok(AddressComponents {
        street,
        neighborhood: first(&[&address.neighbourhood, &address.suburb, &address.quarter]),
        municipality: first(&[
            &address.city,
            &address.town,
            &address.village,
            &address.municipality,
            &address.county,
        ]),
        state: first(&[&address.state]),
        postal_code: first(&[&address.postcode]),
    })
}

fn first(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|candidate| candidate.as_deref())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}
