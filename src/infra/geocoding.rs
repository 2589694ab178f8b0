use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::{
    GeocodeAddressDetail, GeocodeHit, GeocodePrecision, GeocodeQuery, GeocodingPort,
};
use crate::config::GeocodingConfig;
use crate::error::{Result, ValidatorError};

/// Nominatim-style geocoding adapter. One bounded HTTP call per query;
/// transport failures surface as `ProviderUnavailable` so the engine can
/// degrade instead of blocking.
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodingPort for NominatimClient {
    async fn geocode(&self, query: &GeocodeQuery) -> Result<Option<GeocodeHit>> {
        let url = format!("{}/search", self.base_url);
        let country_codes = query.country.to_lowercase();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query.address_line.as_str()),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
                ("countrycodes", country_codes.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ValidatorError::ProviderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ValidatorError::ProviderUnavailable(format!(
                "geocoding request returned status {}",
                response.status()
            )));
        }

        let results: Vec<Value> = response
            .json()
            .await
            .map_err(|e| ValidatorError::ProviderUnavailable(e.to_string()))?;

        let Some(first) = results.into_iter().next() else {
            debug!(query = %query.address_line, "geocoder found no match");
            return Ok(None);
        };

        Ok(Some(hit_from_payload(first)?))
    }
}

fn hit_from_payload(payload: Value) -> Result<GeocodeHit> {
    let matched_address = payload["display_name"].as_str().unwrap_or_default().to_string();
    let latitude = coordinate(&payload["lat"])?;
    let longitude = coordinate(&payload["lon"])?;
    let precision = precision_from(payload["addresstype"].as_str().unwrap_or_default());

    let address = &payload["address"];
    let detail = GeocodeAddressDetail {
        postal_code: str_field(address, "postcode"),
        city: str_field(address, "city")
            .or_else(|| str_field(address, "town"))
            .or_else(|| str_field(address, "village")),
        province: province_code(address),
    };

    Ok(GeocodeHit {
        matched_address,
        latitude,
        longitude,
        precision,
        address: detail,
        raw_payload: payload,
    })
}

// Nominatim returns coordinates as strings
fn coordinate(value: &Value) -> Result<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .ok_or_else(|| ValidatorError::ProviderUnavailable("malformed coordinate in geocoding response".to_string()))
}

fn str_field(address: &Value, key: &str) -> Option<String> {
    address[key].as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// The province sigla comes back as an ISO3166-2 code ("IT-RM"); fall back
/// to the county name when it is absent.
fn province_code(address: &Value) -> Option<String> {
    if let Some(iso) = address["ISO3166-2-lvl6"].as_str() {
        if let Some((_, code)) = iso.split_once('-') {
            if !code.is_empty() {
                return Some(code.to_string());
            }
        }
    }
    str_field(address, "county")
}

fn precision_from(addresstype: &str) -> GeocodePrecision {
    match addresstype {
        "building" | "house" | "address" => GeocodePrecision::Building,
        "road" | "street" => GeocodePrecision::Street,
        "city" | "town" | "village" | "hamlet" | "suburb" | "postcode" => GeocodePrecision::Locality,
        _ => GeocodePrecision::Region,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nominatim_payload() -> Value {
        json!({
            "place_id": 123456,
            "lat": "41.8933203",
            "lon": "12.4829321",
            "addresstype": "city",
            "display_name": "Roma, Roma Capitale, Lazio, 00100, Italia",
            "address": {
                "city": "Roma",
                "county": "Roma Capitale",
                "ISO3166-2-lvl6": "IT-RM",
                "state": "Lazio",
                "postcode": "00100",
                "country": "Italia",
                "country_code": "it"
            }
        })
    }

    #[test]
    fn payload_maps_to_hit() {
        let hit = hit_from_payload(nominatim_payload()).unwrap();
        assert_eq!(hit.address.postal_code.as_deref(), Some("00100"));
        assert_eq!(hit.address.city.as_deref(), Some("Roma"));
        assert_eq!(hit.address.province.as_deref(), Some("RM"));
        assert_eq!(hit.precision, GeocodePrecision::Locality);
        assert!((hit.latitude - 41.8933203).abs() < 1e-9);
    }

    #[test]
    fn county_is_the_province_fallback() {
        let mut payload = nominatim_payload();
        payload["address"].as_object_mut().unwrap().remove("ISO3166-2-lvl6");
        let hit = hit_from_payload(payload).unwrap();
        assert_eq!(hit.address.province.as_deref(), Some("Roma Capitale"));
    }

    #[test]
    fn town_stands_in_for_city() {
        let mut payload = nominatim_payload();
        let address = payload["address"].as_object_mut().unwrap();
        address.remove("city");
        address.insert("town".to_string(), json!("Fiumicino"));
        let hit = hit_from_payload(payload).unwrap();
        assert_eq!(hit.address.city.as_deref(), Some("Fiumicino"));
    }

    #[test]
    fn malformed_coordinates_are_rejected() {
        let mut payload = nominatim_payload();
        payload["lat"] = json!("not-a-number");
        assert!(hit_from_payload(payload).is_err());
    }

    #[test]
    fn unknown_addresstype_maps_to_region() {
        assert_eq!(precision_from("state"), GeocodePrecision::Region);
        assert_eq!(precision_from(""), GeocodePrecision::Region);
    }
}
