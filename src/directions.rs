//! Directions provider — reverse geocoding and turn-by-turn routes.
//!
//! Best-effort side feature: callers fall back to raw coordinates or an
//! apology line when a lookup fails, and never abort the turn.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::DirectionsError;

/// Resolves coordinates and places into human-readable text.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Turn-by-turn instructions from `from` to `to`.
    async fn route(&self, from: &str, to: &str) -> Result<String, DirectionsError>;

    /// Street address for a coordinate pair.
    async fn reverse_geocode(&self, latitude: f64, longitude: f64)
    -> Result<String, DirectionsError>;
}

/// Stand-in used when no API key is configured.
pub struct NoDirections;

#[async_trait]
impl DirectionsProvider for NoDirections {
    async fn route(&self, _from: &str, _to: &str) -> Result<String, DirectionsError> {
        Err(DirectionsError::RequestFailed(
            "no directions provider configured".into(),
        ))
    }

    async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> Result<String, DirectionsError> {
        Err(DirectionsError::RequestFailed(
            "no directions provider configured".into(),
        ))
    }
}

/// Google Maps web-service client.
pub struct GoogleDirections {
    http: reqwest::Client,
    api_key: SecretString,
}

impl GoogleDirections {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct DirectionsResponse {
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct Route {
    legs: Vec<Leg>,
}

#[derive(Deserialize)]
struct Leg {
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct Step {
    html_instructions: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

static HTML_TAG: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"<[^>]+>").expect("tag regex"));

/// Drop HTML tags from instruction text.
fn strip_tags(html: &str) -> String {
    HTML_TAG.replace_all(html, "").into_owned()
}

#[async_trait]
impl DirectionsProvider for GoogleDirections {
    async fn route(&self, from: &str, to: &str) -> Result<String, DirectionsError> {
        let response = self
            .http
            .get("https://maps.googleapis.com/maps/api/directions/json")
            .query(&[
                ("origin", from),
                ("destination", to),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| DirectionsError::RequestFailed(e.to_string()))?;

        let body: DirectionsResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::InvalidResponse(e.to_string()))?;

        let mut instructions = String::new();
        for route in &body.routes {
            for leg in &route.legs {
                for step in &leg.steps {
                    instructions.push_str(&strip_tags(&step.html_instructions));
                    instructions.push('\n');
                }
            }
        }

        if instructions.is_empty() {
            debug!(from = %from, to = %to, "directions response had no routes");
            return Err(DirectionsError::NoRoute {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(instructions)
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<String, DirectionsError> {
        let response = self
            .http
            .get("https://maps.googleapis.com/maps/api/geocode/json")
            .query(&[
                ("latlng", format!("{latitude},{longitude}")),
                ("key", self.api_key.expose_secret().to_string()),
            ])
            .send()
            .await
            .map_err(|e| DirectionsError::RequestFailed(e.to_string()))?;

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::InvalidResponse(e.to_string()))?;

        body.results
            .into_iter()
            .next()
            .map(|r| r.formatted_address)
            .ok_or(DirectionsError::InvalidResponse("no results".into()))
    }
}
