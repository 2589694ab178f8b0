use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::app::ports::{GeocodingPort, TextExtractionPort};
use crate::config::EngineConfig;
use crate::domain::{AddressInput, FieldError, FieldErrorKind, ValidationResult};
use crate::engine::ai_parser;
use crate::engine::gazetteer::Gazetteer;
use crate::engine::scoring::{ConfidenceScorer, ResolutionPath};
use crate::engine::structured::StructuredValidator;
use crate::observability::metrics::validation as validation_metrics;

/// Orchestrates one validation request: dispatch, resolution, scoring.
///
/// Both resolution paths converge in the structured validator before
/// scoring, so AI-derived addresses receive the same geocoding cross-check
/// as directly-structured input.
pub struct ValidateAddressUseCase {
    validator: StructuredValidator,
    extractor: Option<Arc<dyn TextExtractionPort>>,
    scorer: ConfidenceScorer,
    default_country: String,
}

impl ValidateAddressUseCase {
    pub fn new(
        geocoder: Arc<dyn GeocodingPort>,
        extractor: Option<Arc<dyn TextExtractionPort>>,
        gazetteer: Arc<Gazetteer>,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            validator: StructuredValidator::new(
                geocoder,
                gazetteer,
                engine.fuzzy_floor,
                engine.fuzzy_correction_threshold,
            ),
            extractor,
            scorer: ConfidenceScorer::new(engine.validity_threshold),
            default_country: engine.default_country.clone(),
        }
    }

    pub fn default_country(&self) -> &str {
        &self.default_country
    }

    /// Validate one address. Total: upstream failures come back as a
    /// well-formed invalid result, never as an error.
    #[instrument(skip(self, input), fields(request_id = %Uuid::new_v4()))]
    pub async fn validate(&self, input: AddressInput) -> ValidationResult {
        let result = match input {
            AddressInput::Structured(addr) => {
                validation_metrics::structured_request();
                let outcome = self.validator.validate(&addr).await;
                self.scorer.score(outcome, ResolutionPath::Structured)
            }
            AddressInput::Raw {
                raw_address,
                country,
            } => {
                validation_metrics::raw_request();
                self.validate_raw(&raw_address, &country).await
            }
        };

        validation_metrics::result_recorded(result.is_valid);
        info!(
            is_valid = result.is_valid,
            confidence = result.confidence,
            suggestions = result.suggestions.len(),
            "validation complete"
        );
        result
    }

    async fn validate_raw(&self, raw_address: &str, country: &str) -> ValidationResult {
        let Some(extractor) = &self.extractor else {
            validation_metrics::ai_unconfigured();
            return ValidationResult::rejected(vec![FieldError {
                field: "rawAddress".to_string(),
                kind: FieldErrorKind::Configuration,
                message: "AI address parsing is unavailable: no extraction credentials configured"
                    .to_string(),
            }]);
        };

        let instruction = ai_parser::extraction_instruction(country);
        let response = match extractor.extract(&instruction, raw_address).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "text model call failed");
                validation_metrics::ai_call_failed();
                return ValidationResult::rejected(vec![FieldError {
                    field: "ai_response".to_string(),
                    kind: FieldErrorKind::ProviderUnavailable,
                    message: "text model request failed".to_string(),
                }]);
            }
        };

        let extracted = match ai_parser::parse_extraction(&response, country) {
            Ok(extracted) => extracted,
            Err(reason) => {
                warn!(%reason, "model response failed strict extraction parse");
                validation_metrics::ai_parse_failure();
                return ValidationResult::rejected(vec![FieldError {
                    field: "ai_response".to_string(),
                    kind: FieldErrorKind::ParseFailure,
                    message: reason,
                }]);
            }
        };

        let structured = extracted.to_structured();
        let mut outcome = self.validator.validate(&structured).await;
        // keep the extraction available for pre-fill even when nothing
        // confirmed it; the scorer holds such results below the threshold
        if outcome.normalized.is_none() {
            outcome.normalized = Some(extracted.unverified_normalized());
        }

        self.scorer.score(
            outcome,
            ResolutionPath::AiExtraction {
                extraction_confidence: extracted.extraction_confidence,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{GeocodeAddressDetail, GeocodeHit, GeocodePrecision, GeocodeQuery};
    use crate::domain::NormalizedSource;
    use crate::error::{Result, ValidatorError};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedGeocoder {
        hit: Option<GeocodeHit>,
    }

    #[async_trait]
    impl GeocodingPort for FixedGeocoder {
        async fn geocode(&self, _query: &GeocodeQuery) -> Result<Option<GeocodeHit>> {
            Ok(self.hit.clone())
        }
    }

    struct FixedExtractor {
        response: Result<String>,
    }

    #[async_trait]
    impl TextExtractionPort for FixedExtractor {
        async fn extract(&self, _instruction: &str, _raw_text: &str) -> Result<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(ValidatorError::ExtractionUnavailable(
                    "scripted outage".to_string(),
                )),
            }
        }
    }

    fn milano_hit() -> GeocodeHit {
        GeocodeHit {
            matched_address: "Via Roma 5, 20100 Milano, Italia".to_string(),
            latitude: 45.46,
            longitude: 9.19,
            precision: GeocodePrecision::Street,
            address: GeocodeAddressDetail {
                postal_code: Some("20100".to_string()),
                city: Some("Milano".to_string()),
                province: Some("MI".to_string()),
            },
            raw_payload: json!({}),
        }
    }

    fn use_case(
        hit: Option<GeocodeHit>,
        extractor: Option<Arc<dyn TextExtractionPort>>,
    ) -> ValidateAddressUseCase {
        ValidateAddressUseCase::new(
            Arc::new(FixedGeocoder { hit }),
            extractor,
            Arc::new(Gazetteer::builtin().unwrap()),
            &EngineConfig::default(),
        )
    }

    fn raw_input() -> AddressInput {
        AddressInput::Raw {
            raw_address: "Via Roma 5, 20100 Milano MI".to_string(),
            country: "IT".to_string(),
        }
    }

    #[tokio::test]
    async fn raw_path_extracts_then_cross_checks() {
        let extractor = Arc::new(FixedExtractor {
            response: Ok(r#"{"destinatario": null, "street": "Via Roma 5",
                "cap": "20100", "city": "Milano", "province": "MI",
                "country": "IT", "confidence": 0.9}"#
                .to_string()),
        });
        let use_case = use_case(Some(milano_hit()), Some(extractor));

        let result = use_case.validate(raw_input()).await;
        assert!(result.is_valid);
        let normalized = result.normalized.unwrap();
        assert_eq!(normalized.city, "Milano");
        assert_eq!(normalized.street_line.as_deref(), Some("Via Roma 5"));
        assert_eq!(normalized.source, NormalizedSource::Provider);
    }

    #[tokio::test]
    async fn unparseable_model_response_fails_closed() {
        let extractor = Arc::new(FixedExtractor {
            response: Ok("I could not make sense of that address.".to_string()),
        });
        let use_case = use_case(Some(milano_hit()), Some(extractor));

        let result = use_case.validate(raw_input()).await;
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "ai_response");
        assert_eq!(result.errors[0].kind, FieldErrorKind::ParseFailure);
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit_the_ai_path() {
        let use_case = use_case(Some(milano_hit()), None);

        let result = use_case.validate(raw_input()).await;
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].kind, FieldErrorKind::Configuration);
        assert!(result.errors[0].message.contains("unavailable"));
    }

    #[tokio::test]
    async fn model_outage_is_not_a_parse_failure() {
        let extractor = Arc::new(FixedExtractor {
            response: Err(ValidatorError::ExtractionUnavailable("down".to_string())),
        });
        let use_case = use_case(Some(milano_hit()), Some(extractor));

        let result = use_case.validate(raw_input()).await;
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].kind, FieldErrorKind::ProviderUnavailable);
    }

    #[tokio::test]
    async fn unconfirmed_extraction_is_kept_for_prefill_but_invalid() {
        let extractor = Arc::new(FixedExtractor {
            response: Ok(r#"{"cap": "99999", "city": "Atlantide", "province": "ZZ",
                "confidence": 1.0}"#
                .to_string()),
        });
        // geocoder finds nothing for the extracted fields
        let use_case = use_case(None, Some(extractor));

        let result = use_case.validate(raw_input()).await;
        assert!(!result.is_valid);
        let normalized = result.normalized.unwrap();
        assert_eq!(normalized.source, NormalizedSource::AiExtraction);
        assert_eq!(normalized.city, "Atlantide");
    }

    #[tokio::test]
    async fn structured_path_validates_directly() {
        let use_case = use_case(Some(milano_hit()), None);
        let input = AddressInput::Structured(crate::domain::StructuredAddress {
            postal_code: "20100".to_string(),
            city: "Milano".to_string(),
            province: "MI".to_string(),
            country: "IT".to_string(),
            full_address_hint: None,
            recipient: None,
        });

        let result = use_case.validate(input).await;
        assert!(result.is_valid);
        assert!(result.confidence >= 0.9);
    }
}
