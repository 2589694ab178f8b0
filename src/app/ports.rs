use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One structured query against the geocoding provider.
#[derive(Debug, Clone)]
pub struct GeocodeQuery {
    pub address_line: String,
    pub country: String,
}

/// Best-match result from the geocoding provider. Owned transiently by the
/// request that fetched it; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub matched_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub precision: GeocodePrecision,
    pub address: GeocodeAddressDetail,
    pub raw_payload: serde_json::Value,
}

/// The field-level breakdown the provider attaches to a hit. Any of these
/// may be missing depending on match precision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeocodeAddressDetail {
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
}

/// How precisely the provider located the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodePrecision {
    Building,
    Street,
    Locality,
    Region,
}

/// Narrow capability interface over the geocoding provider, so the scoring
/// and fuzzy-matching logic is testable with deterministic fakes.
#[async_trait]
pub trait GeocodingPort: Send + Sync {
    /// `Ok(None)` means the provider answered but found no match; `Err`
    /// means it was unreachable or timed out.
    async fn geocode(&self, query: &GeocodeQuery) -> Result<Option<GeocodeHit>>;
}

/// Narrow capability interface over the generative text model.
#[async_trait]
pub trait TextExtractionPort: Send + Sync {
    /// Submit an extraction instruction plus raw text. Returns the model's
    /// textual response verbatim; the caller treats it as untrusted.
    async fn extract(&self, instruction: &str, raw_text: &str) -> Result<String>;
}
