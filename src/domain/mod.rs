use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidatorError};

/// HTTP body accepted by `POST /validate-address`. Both request modes share
/// one wire shape; the dispatcher decides which variant is active.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAddressBody {
    pub cap: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub full_address: Option<String>,
    pub raw_address: Option<String>,
}

/// The two resolution modes. Exactly one variant is active per request.
#[derive(Debug, Clone)]
pub enum AddressInput {
    Structured(StructuredAddress),
    Raw { raw_address: String, country: String },
}

impl AddressInput {
    /// Mode dispatcher: a non-empty `rawAddress` selects the AI extraction
    /// path; otherwise `cap`, `city` and `province` must all be present.
    /// Incomplete structured input fails here, before any network call.
    pub fn from_body(body: &ValidateAddressBody, default_country: &str) -> Result<Self> {
        let country = body
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(default_country)
            .to_uppercase();

        if let Some(raw) = body.raw_address.as_deref() {
            if !raw.trim().is_empty() {
                return Ok(AddressInput::Raw {
                    raw_address: raw.trim().to_string(),
                    country,
                });
            }
        }

        let cap = non_empty(&body.cap);
        let city = non_empty(&body.city);
        let province = non_empty(&body.province);

        let mut missing = Vec::new();
        if cap.is_none() {
            missing.push("cap".to_string());
        }
        if city.is_none() {
            missing.push("city".to_string());
        }
        if province.is_none() {
            missing.push("province".to_string());
        }

        match (cap, city, province) {
            (Some(postal_code), Some(city), Some(province)) => {
                Ok(AddressInput::Structured(StructuredAddress {
                    postal_code,
                    city,
                    province,
                    country,
                    full_address_hint: non_empty(&body.full_address),
                    recipient: None,
                }))
            }
            _ => Err(ValidatorError::MissingFields(missing)),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Discrete address fields, either supplied directly by the client or
/// recovered from raw text by the AI parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAddress {
    pub postal_code: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub full_address_hint: Option<String>,
    pub recipient: Option<String>,
}

impl StructuredAddress {
    /// The single address line sent to the geocoding provider.
    pub fn address_line(&self) -> String {
        let core = format!(
            "{} {} {}, {}",
            self.postal_code, self.city, self.province, self.country
        );
        match &self.full_address_hint {
            Some(street) => format!("{}, {}", street, core),
            None => core,
        }
    }
}

/// A fully normalized destination, ready to pre-fill a shipment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAddress {
    pub street_line: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub recipient: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub matched_address: Option<String>,
    pub source: NormalizedSource,
}

/// Which resolution strategy produced the normalized address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedSource {
    /// The geocoding provider confirmed the address as supplied.
    Provider,
    /// The provider confirmed the address after a fuzzy city correction.
    FuzzyCorrected,
    /// Gazetteer-only verdict, provider unavailable.
    FuzzyFallback,
    /// Straight from the text model, no geocode confirmation.
    AiExtraction,
}

/// A proposed correction to one field, offered when confidence alone is not
/// sufficient for auto-acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionSuggestion {
    pub field: String,
    pub suggested_value: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    MissingField,
    ParseFailure,
    ProviderUnavailable,
    Configuration,
}

/// The unique output of a validation call.
///
/// Invariant: `is_valid == true` implies `normalized.is_some()` and
/// `confidence` at or above the validity threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub normalized: Option<NormalizedAddress>,
    pub confidence: f64,
    pub suggestions: Vec<CorrectionSuggestion>,
    pub errors: Vec<FieldError>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// A failed validation carrying only the given errors.
    pub fn rejected(errors: Vec<FieldError>) -> Self {
        Self {
            is_valid: false,
            normalized: None,
            confidence: 0.0,
            suggestions: Vec::new(),
            errors,
            validated_at: Utc::now(),
        }
    }
}
