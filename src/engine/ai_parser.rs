use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::domain::{NormalizedAddress, NormalizedSource, StructuredAddress};

/// Structured fields recovered from a freeform address by the text model.
#[derive(Debug, Clone)]
pub struct ExtractedAddress {
    pub recipient_guess: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub street_line: Option<String>,
    /// The model's own certainty, clamped to [0, 1].
    pub extraction_confidence: f64,
}

/// Confidence assigned when the model omits its own estimate: structurally
/// valid but unverified.
pub const DEFAULT_EXTRACTION_CONFIDENCE: f64 = 0.5;

/// Wire shape the model is instructed to produce. Every field is optional
/// here: the response is untrusted and may be partially filled.
#[derive(Debug, Deserialize)]
struct ExtractionWire {
    #[serde(alias = "destinatario")]
    recipient: Option<String>,
    #[serde(alias = "street_line")]
    street: Option<String>,
    #[serde(alias = "postal_code")]
    cap: Option<String>,
    city: Option<String>,
    province: Option<String>,
    country: Option<String>,
    confidence: Option<f64>,
}

// greedy, so it spans from the first "{" to the last "}" and survives
// markdown fences or chatter around the object
static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static CAP_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());

/// The fixed instruction sent with every raw address. The model must answer
/// with machine-parseable structured text, never prose.
pub fn extraction_instruction(country: &str) -> String {
    format!(
        "You extract shipping destinations from raw address text. \
         Reply with a single JSON object and nothing else - no prose, no markdown. \
         Keys: \"destinatario\" (recipient name or null), \
         \"street\" (street and number or null), \
         \"cap\" (5-digit postal code), \
         \"city\" (comune name), \
         \"province\" (two-letter code), \
         \"country\" (ISO code, default {country}), \
         \"confidence\" (number from 0 to 1, your certainty). \
         Use null for anything you cannot find. The address follows."
    )
}

/// Decode the model's textual response into an [`ExtractedAddress`].
///
/// Fails closed: any response that cannot be decoded into the required
/// shape is rejected with a reason, never propagated as a half-filled
/// guess. The `Err` string becomes the client-visible parse-failure
/// message.
pub fn parse_extraction(
    response: &str,
    default_country: &str,
) -> std::result::Result<ExtractedAddress, String> {
    let body = JSON_OBJECT
        .find(response)
        .ok_or_else(|| "no JSON object in model response".to_string())?
        .as_str();

    let wire: ExtractionWire = serde_json::from_str(body)
        .map_err(|e| format!("model response is not valid JSON: {e}"))?;

    let postal_code = required(wire.cap, "cap")?;
    if !CAP_SHAPE.is_match(&postal_code) {
        return Err(format!(
            "extracted cap \"{postal_code}\" is not a 5-digit postal code"
        ));
    }
    let city = required(wire.city, "city")?;
    let province = required(wire.province, "province")?;

    let country = optional(wire.country)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| default_country.to_uppercase());

    let extraction_confidence = wire
        .confidence
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_EXTRACTION_CONFIDENCE);

    Ok(ExtractedAddress {
        recipient_guess: optional(wire.recipient),
        postal_code,
        city,
        province,
        country,
        street_line: optional(wire.street),
        extraction_confidence,
    })
}

fn required(value: Option<String>, name: &str) -> std::result::Result<String, String> {
    optional(value).ok_or_else(|| format!("model response missing \"{name}\""))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

impl ExtractedAddress {
    /// Hand the extracted fields to the structured validator: AI output is
    /// never trusted standalone.
    pub fn to_structured(&self) -> StructuredAddress {
        StructuredAddress {
            postal_code: self.postal_code.clone(),
            city: self.city.clone(),
            province: self.province.clone(),
            country: self.country.clone(),
            full_address_hint: self.street_line.clone(),
            recipient: self.recipient_guess.clone(),
        }
    }

    /// Normalized shape for when no geocode confirmation was possible.
    pub fn unverified_normalized(&self) -> NormalizedAddress {
        NormalizedAddress {
            street_line: self.street_line.clone(),
            postal_code: self.postal_code.clone(),
            city: self.city.clone(),
            province: self.province.clone(),
            country: self.country.clone(),
            recipient: self.recipient_guess.clone(),
            latitude: None,
            longitude: None,
            matched_address: None,
            source: NormalizedSource::AiExtraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_json_parses() {
        let response = r#"{"destinatario": "Mario Rossi", "street": "Via Roma 5",
            "cap": "20100", "city": "Milano", "province": "MI",
            "country": "IT", "confidence": 0.92}"#;

        let extracted = parse_extraction(response, "IT").unwrap();
        assert_eq!(extracted.postal_code, "20100");
        assert_eq!(extracted.city, "Milano");
        assert_eq!(extracted.province, "MI");
        assert_eq!(extracted.street_line.as_deref(), Some("Via Roma 5"));
        assert_eq!(extracted.recipient_guess.as_deref(), Some("Mario Rossi"));
        assert_eq!(extracted.extraction_confidence, 0.92);
    }

    #[test]
    fn markdown_fences_are_tolerated() {
        let response = "Sure! Here is the extraction:\n```json\n{\"cap\": \"00100\", \"city\": \"Roma\", \"province\": \"RM\"}\n```";
        let extracted = parse_extraction(response, "IT").unwrap();
        assert_eq!(extracted.city, "Roma");
        assert_eq!(extracted.country, "IT");
    }

    #[test]
    fn missing_confidence_defaults_conservatively() {
        let response = r#"{"cap": "00100", "city": "Roma", "province": "RM"}"#;
        let extracted = parse_extraction(response, "IT").unwrap();
        assert_eq!(
            extracted.extraction_confidence,
            DEFAULT_EXTRACTION_CONFIDENCE
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let response = r#"{"cap": "00100", "city": "Roma", "province": "RM", "confidence": 3.5}"#;
        let extracted = parse_extraction(response, "IT").unwrap();
        assert_eq!(extracted.extraction_confidence, 1.0);
    }

    #[test]
    fn prose_without_json_fails_closed() {
        let err = parse_extraction("I could not find an address in that text.", "IT").unwrap_err();
        assert!(err.contains("no JSON object"));
    }

    #[test]
    fn missing_required_field_fails_closed() {
        let response = r#"{"cap": "00100", "province": "RM"}"#;
        let err = parse_extraction(response, "IT").unwrap_err();
        assert!(err.contains("city"));
    }

    #[test]
    fn literal_null_strings_count_as_missing() {
        let response = r#"{"cap": "00100", "city": "null", "province": "RM"}"#;
        assert!(parse_extraction(response, "IT").is_err());
    }

    #[test]
    fn malformed_cap_fails_closed() {
        let response = r#"{"cap": "ABC12", "city": "Roma", "province": "RM"}"#;
        let err = parse_extraction(response, "IT").unwrap_err();
        assert!(err.contains("5-digit"));
    }

    #[test]
    fn broken_json_fails_closed() {
        let response = r#"{"cap": "00100", "city": "Roma", "#;
        assert!(parse_extraction(response, "IT").is_err());
    }
}
