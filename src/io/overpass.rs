//! Nearest-road lookup against the Overpass API

use crate::infra::config::Config;
use crate::services::road_classifier::{LookupError, RoadLookup};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Queries Overpass for the nearest way tagged `highway`
pub struct OverpassClient {
    http: reqwest::Client,
    url: String,
    radius_m: u32,
}

impl OverpassClient {
    pub fn new(config: &Config) -> Self {
        // Build the HTTP client once for connection reuse
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.road_lookup_timeout_ms()))
            .build()
            .unwrap_or_default();

        Self {
            http,
            url: config.overpass_url().to_string(),
            radius_m: config.road_search_radius_m(),
        }
    }

    fn build_query(radius_m: u32, lat: f64, lon: f64) -> String {
        format!(
            "[out:json][timeout:10];(way[\"highway\"](around:{radius_m},{lat:.6},{lon:.6}););out tags;"
        )
    }
}

#[async_trait]
impl RoadLookup for OverpassClient {
    async fn highway_tag(&self, lat: f64, lon: f64) -> Result<Option<String>, LookupError> {
        let query = Self::build_query(self.radius_m, lat, lon);

        let response = self
            .http
            .post(&self.url)
            .body(query)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LookupError::Request(format!("status {}", response.status())));
        }

        let body: OverpassResponse =
            response.json().await.map_err(|e| LookupError::Request(e.to_string()))?;

        let tag = body.elements.into_iter().next().and_then(|el| el.tags.get("highway").cloned());
        debug!(lat, lon, tag = ?tag, "overpass_lookup");
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let query = OverpassClient::build_query(20, 24.8607, 67.0011);

        assert!(query.starts_with("[out:json]"));
        assert!(query.contains("way[\"highway\"](around:20,24.860700,67.001100)"));
        assert!(query.ends_with("out tags;"));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "elements": [
                {"tags": {"highway": "primary", "name": "Shahrah-e-Faisal"}},
                {"tags": {"highway": "residential"}}
            ]
        }"#;

        let parsed: OverpassResponse = serde_json::from_str(body).unwrap();
        let tag = parsed.elements.into_iter().next().and_then(|el| el.tags.get("highway").cloned());

        assert_eq!(tag, Some("primary".to_string()));
    }

    #[test]
    fn test_response_without_elements() {
        let parsed: OverpassResponse = serde_json::from_str(r#"{"elements": []}"#).unwrap();
        assert!(parsed.elements.is_empty());
    }
}
