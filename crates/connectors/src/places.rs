use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use tabi_core::{CollaboratorError, LangCode, PlaceCategory, PlaceResult, PlacesSearch};
use tracing::debug;
use url::Url;

use crate::google_translate::google_code;
use crate::{check_status, http_client, send_error};

const SERVICE: &str = "places";
const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
pub const MAX_RESULTS: usize = 5;

/// Google Places text search. Queries go out in Japanese with the
/// normalized place name; results are formatted by the handlers.
pub struct PlacesClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PlacesClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(
        &self,
        location: &str,
        query: &str,
        category: PlaceCategory,
        language: LangCode,
    ) -> Result<Url, CollaboratorError> {
        let place_type = match category {
            PlaceCategory::Restaurant => "restaurant",
            PlaceCategory::Tourism => "tourist_attraction",
        };
        let search = format!("{location} {query}");
        Url::parse_with_params(
            &format!("{}/textsearch/json", self.base_url),
            &[
                ("query", search.as_str()),
                ("language", google_code(language)),
                ("type", place_type),
                ("key", self.api_key.as_str()),
            ],
        )
        .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))
    }
}

#[derive(Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawPlace>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct RawPlace {
    #[serde(default)]
    name: String,
    #[serde(default)]
    formatted_address: String,
    #[serde(default)]
    rating: f32,
    #[serde(default)]
    opening_hours: Option<OpeningHours>,
    #[serde(default)]
    place_id: String,
}

#[derive(Deserialize)]
struct OpeningHours {
    open_now: Option<bool>,
}

/// `OK` and `ZERO_RESULTS` are answers; every other status is an error.
pub fn parse_places(value: serde_json::Value) -> Result<Vec<PlaceResult>, CollaboratorError> {
    let response: TextSearchResponse = serde_json::from_value(value)
        .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))?;
    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(Vec::new()),
        other => {
            return Err(CollaboratorError::unavailable(
                SERVICE,
                format!("{other}: {}", response.error_message.unwrap_or_default()),
            ))
        }
    }
    Ok(response
        .results
        .into_iter()
        .filter(|place| !place.name.trim().is_empty())
        .take(MAX_RESULTS)
        .map(|place| PlaceResult {
            maps_url: if place.place_id.is_empty() {
                String::new()
            } else {
                format!("https://www.google.com/maps/place/?q=place_id:{}", place.place_id)
            },
            name: place.name,
            address: place.formatted_address,
            rating: place.rating,
            open_now: place.opening_hours.and_then(|hours| hours.open_now),
        })
        .collect())
}

impl PlacesSearch for PlacesClient {
    fn search(
        &self,
        location: &str,
        query: &str,
        category: PlaceCategory,
        language: LangCode,
    ) -> Result<Vec<PlaceResult>, CollaboratorError> {
        let url = self.search_url(location, query, category, language)?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| send_error(SERVICE, err))?;
        let value = check_status(SERVICE, response)?
            .json::<serde_json::Value>()
            .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))?;
        let places = parse_places(value)?;
        debug!(location, category = category.as_str(), found = places.len(), "places search");
        Ok(places)
    }
}
