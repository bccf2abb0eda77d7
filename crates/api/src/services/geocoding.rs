//! BAN geocoding client and address-validation adapter.
//!
//! Validation is a single free-text lookup against the Base Adresse
//! Nationale search endpoint, limited to the top match. Only the first
//! candidate's confidence score matters: strictly above [`SCORE_THRESHOLD`]
//! confirms the address. Lookup failures never propagate to the caller;
//! they collapse into [`AddressVerdict::Unconfirmed`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeocodingConfig;
use crate::models::NewAddress;
use crate::ports::{AddressValidator, AddressVerdict};

/// Minimum confidence score (exclusive) for a confirmed match.
const SCORE_THRESHOLD: f64 = 0.5;

/// Errors that can occur when querying the geocoding API.
#[derive(Debug, Error)]
pub enum GeocodingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Client for the BAN search endpoint.
#[derive(Clone)]
pub struct BanClient {
    client: reqwest::Client,
    base_url: String,
}

impl BanClient {
    /// Create a new geocoding client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GeocodingConfig) -> Result<Self, GeocodingError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert(
            "User-Agent",
            HeaderValue::from_static("carnet-api/0.1 (+https://github.com/carnet-hq/carnet)"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Search the BAN index with a free-text query, returning at most
    /// `limit` ranked candidates.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is not the
    /// expected GeoJSON feature collection.
    pub async fn search(&self, query: &str, limit: u8) -> Result<SearchResponse, GeocodingError> {
        let url = format!(
            "{}/search?q={}&limit={limit}",
            self.base_url,
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GeocodingError::Parse(e.to_string()))
    }
}

/// Address validator backed by the BAN geocoding API.
#[derive(Clone)]
pub struct BanAddressValidator {
    client: BanClient,
}

impl BanAddressValidator {
    /// Create a validator over an existing client.
    #[must_use]
    pub const fn new(client: BanClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AddressValidator for BanAddressValidator {
    async fn validate(&self, address: &NewAddress) -> AddressVerdict {
        let query = free_text_query(address);

        match self.client.search(&query, 1).await {
            Ok(response) => verdict_from_response(&response),
            Err(e) => {
                // Single attempt, no retry: an unreachable geocoder leaves
                // the address unconfirmed.
                tracing::warn!(error = %e, query = %query, "geocoding lookup failed");
                AddressVerdict::Unconfirmed
            }
        }
    }
}

/// Build the lookup query as "street postal_code city".
///
/// The country is not part of the BAN lookup.
fn free_text_query(address: &NewAddress) -> String {
    format!(
        "{} {} {}",
        address.street, address.postal_code, address.city
    )
}

/// Inspect the top candidate's score against the threshold.
fn verdict_from_response(response: &SearchResponse) -> AddressVerdict {
    match response.features.first().and_then(|f| f.properties.score) {
        Some(score) if score > SCORE_THRESHOLD => AddressVerdict::Confirmed,
        _ => AddressVerdict::Rejected,
    }
}

/// GeoJSON feature collection returned by the search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// A single ranked candidate.
#[derive(Debug, Deserialize)]
pub struct Feature {
    pub properties: FeatureProperties,
}

/// Candidate metadata; only the confidence score is inspected.
#[derive(Debug, Deserialize)]
pub struct FeatureProperties {
    pub score: Option<f64>,
    pub label: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn response_with_score(score: Option<f64>) -> SearchResponse {
        SearchResponse {
            features: vec![Feature {
                properties: FeatureProperties {
                    score,
                    label: Some("1 Rue Test 75001 Paris".to_owned()),
                },
            }],
        }
    }

    #[test]
    fn test_verdict_empty_features() {
        let response = SearchResponse { features: vec![] };
        assert_eq!(verdict_from_response(&response), AddressVerdict::Rejected);
    }

    #[test]
    fn test_verdict_missing_score() {
        let response = response_with_score(None);
        assert_eq!(verdict_from_response(&response), AddressVerdict::Rejected);
    }

    #[test]
    fn test_verdict_score_at_threshold_is_rejected() {
        // The threshold is exclusive: exactly 0.5 does not confirm.
        let response = response_with_score(Some(0.5));
        assert_eq!(verdict_from_response(&response), AddressVerdict::Rejected);
    }

    #[test]
    fn test_verdict_score_above_threshold() {
        let response = response_with_score(Some(0.51));
        assert_eq!(verdict_from_response(&response), AddressVerdict::Confirmed);
    }

    #[test]
    fn test_free_text_query_order() {
        let address = NewAddress {
            street: "1 rue Test".to_owned(),
            city: "Paris".to_owned(),
            postal_code: "75001".to_owned(),
            country: "FR".to_owned(),
        };
        assert_eq!(free_text_query(&address), "1 rue Test 75001 Paris");
    }

    #[test]
    fn test_deserialize_ban_payload() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [2.34, 48.86] },
                    "properties": { "label": "1 Rue Test 75001 Paris", "score": 0.87 }
                }
            ]
        }"#;

        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.features.len(), 1);
        assert_eq!(verdict_from_response(&response), AddressVerdict::Confirmed);
    }

    #[test]
    fn test_deserialize_empty_body_defaults() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.features.is_empty());
    }
}
