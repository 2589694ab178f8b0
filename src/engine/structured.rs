use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::ports::{GeocodeHit, GeocodePrecision, GeocodeQuery, GeocodingPort};
use crate::domain::{
    CorrectionSuggestion, FieldError, FieldErrorKind, NormalizedAddress, NormalizedSource,
    StructuredAddress,
};
use crate::engine::fuzzy::{normalize_key, province_matches, FuzzyMatcher};
use crate::engine::gazetteer::Gazetteer;

/// Evidence tier produced by the structured validation pass, ranked by trust.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvidence {
    /// Provider agreed with every comparable input field.
    GeocodeExact,
    /// Provider matched but disagreed on, or omitted, at least one field.
    GeocodePartial,
    /// Provider matched only after a fuzzy city correction.
    FuzzyCorrectedGeocode { similarity: f64 },
    /// Provider unavailable; the gazetteer alone vouches for the city.
    FuzzyOnly { similarity: f64 },
    /// Nothing vouches for this address.
    NoMatch,
}

/// Outcome of the structured pass, before confidence scoring.
#[derive(Debug, Clone)]
pub struct StructuredOutcome {
    pub evidence: MatchEvidence,
    pub normalized: Option<NormalizedAddress>,
    pub suggestions: Vec<CorrectionSuggestion>,
    pub errors: Vec<FieldError>,
}

/// Validates discrete address fields against the geocoding provider, with
/// one fuzzy-corrected retry and a gazetteer-only degradation path.
pub struct StructuredValidator {
    geocoder: Arc<dyn GeocodingPort>,
    gazetteer: Arc<Gazetteer>,
    matcher: FuzzyMatcher,
    correction_threshold: f64,
}

impl StructuredValidator {
    pub fn new(
        geocoder: Arc<dyn GeocodingPort>,
        gazetteer: Arc<Gazetteer>,
        fuzzy_floor: f64,
        correction_threshold: f64,
    ) -> Self {
        Self {
            geocoder,
            gazetteer,
            matcher: FuzzyMatcher::new(fuzzy_floor),
            correction_threshold,
        }
    }

    pub async fn validate(&self, addr: &StructuredAddress) -> StructuredOutcome {
        let query = GeocodeQuery {
            address_line: addr.address_line(),
            country: addr.country.clone(),
        };

        match self.geocoder.geocode(&query).await {
            Ok(Some(hit)) => self.compare(addr, &hit, None),
            Ok(None) => {
                debug!(city = %addr.city, "no geocode match, trying fuzzy correction");
                self.retry_with_correction(addr).await
            }
            Err(e) => {
                warn!(error = %e, "geocoding unavailable, degrading to gazetteer-only verdict");
                self.fuzzy_fallback(addr)
            }
        }
    }

    /// One retry with the gazetteer's spelling of the city. The correction
    /// suggestion is recorded whether or not the retry finds a match.
    async fn retry_with_correction(&self, addr: &StructuredAddress) -> StructuredOutcome {
        let candidate = self
            .matcher
            .best_match(&self.gazetteer, &addr.city, Some(&addr.province));

        let m = match candidate {
            Some(m)
                if m.similarity >= self.correction_threshold
                    && normalize_key(&m.entry.city) != normalize_key(&addr.city) =>
            {
                m
            }
            // no usable correction: either nothing close enough, or the
            // provider already saw the gazetteer spelling and found nothing
            _ => {
                return StructuredOutcome {
                    evidence: MatchEvidence::NoMatch,
                    normalized: None,
                    suggestions: Vec::new(),
                    errors: Vec::new(),
                }
            }
        };

        let suggestion = CorrectionSuggestion {
            field: "city".to_string(),
            suggested_value: m.entry.canonical_name.clone(),
            reason: format!(
                "\"{}\" is not a known comune; closest match is \"{}\"",
                addr.city, m.entry.canonical_name
            ),
        };

        let corrected = StructuredAddress {
            city: m.entry.canonical_name.clone(),
            ..addr.clone()
        };

        crate::observability::metrics::validation::geocode_retry();
        let query = GeocodeQuery {
            address_line: corrected.address_line(),
            country: corrected.country.clone(),
        };

        match self.geocoder.geocode(&query).await {
            Ok(Some(hit)) => {
                let mut outcome = self.compare(&corrected, &hit, Some(m.similarity));
                outcome.suggestions.insert(0, suggestion);
                outcome
            }
            Ok(None) => StructuredOutcome {
                evidence: MatchEvidence::NoMatch,
                normalized: None,
                suggestions: vec![suggestion],
                errors: Vec::new(),
            },
            Err(e) => {
                warn!(error = %e, "geocoding unavailable on retry");
                self.fuzzy_fallback(addr)
            }
        }
    }

    /// Field-level agreement between the input and the provider's hit.
    fn compare(
        &self,
        addr: &StructuredAddress,
        hit: &GeocodeHit,
        correction: Option<f64>,
    ) -> StructuredOutcome {
        let mut suggestions = Vec::new();
        let mut exact = true;

        match hit.address.postal_code.as_deref().map(str::trim) {
            Some(provider_cap) if provider_cap == addr.postal_code => {}
            Some(provider_cap) => {
                exact = false;
                suggestions.push(CorrectionSuggestion {
                    field: "cap".to_string(),
                    suggested_value: provider_cap.to_string(),
                    reason: format!(
                        "geocoder places \"{}\" in CAP {}",
                        addr.city, provider_cap
                    ),
                });
            }
            None => exact = false,
        }

        match hit.address.city.as_deref().map(str::trim) {
            Some(provider_city) if normalize_key(provider_city) == normalize_key(&addr.city) => {}
            Some(provider_city) => {
                exact = false;
                suggestions.push(CorrectionSuggestion {
                    field: "city".to_string(),
                    suggested_value: provider_city.to_string(),
                    reason: format!("geocoder resolved the address to \"{}\"", provider_city),
                });
            }
            None => exact = false,
        }

        match hit.address.province.as_deref().map(str::trim) {
            Some(provider_province) if self.provinces_agree(addr, hit, provider_province) => {}
            Some(provider_province) => {
                exact = false;
                suggestions.push(CorrectionSuggestion {
                    field: "province".to_string(),
                    suggested_value: provider_province.to_string(),
                    reason: format!(
                        "geocoder places \"{}\" in province {}",
                        addr.city, provider_province
                    ),
                });
            }
            None => exact = false,
        }

        // a region-level hit never counts as exact agreement
        if hit.precision == GeocodePrecision::Region {
            exact = false;
        }

        let normalized = NormalizedAddress {
            street_line: addr.full_address_hint.clone(),
            postal_code: hit
                .address
                .postal_code
                .as_deref()
                .map(str::trim)
                .map(str::to_string)
                .unwrap_or_else(|| addr.postal_code.clone()),
            city: hit
                .address
                .city
                .as_deref()
                .map(str::trim)
                .map(str::to_string)
                .unwrap_or_else(|| addr.city.clone()),
            province: hit
                .address
                .province
                .as_deref()
                .map(str::trim)
                .map(str::to_string)
                .unwrap_or_else(|| addr.province.clone()),
            country: addr.country.clone(),
            recipient: addr.recipient.clone(),
            latitude: Some(hit.latitude),
            longitude: Some(hit.longitude),
            matched_address: Some(hit.matched_address.clone()),
            source: if correction.is_some() {
                NormalizedSource::FuzzyCorrected
            } else {
                NormalizedSource::Provider
            },
        };

        let evidence = match correction {
            Some(similarity) => MatchEvidence::FuzzyCorrectedGeocode { similarity },
            None if exact => MatchEvidence::GeocodeExact,
            None => MatchEvidence::GeocodePartial,
        };

        StructuredOutcome {
            evidence,
            normalized: Some(normalized),
            suggestions,
            errors: Vec::new(),
        }
    }

    fn provinces_agree(
        &self,
        addr: &StructuredAddress,
        hit: &GeocodeHit,
        provider_province: &str,
    ) -> bool {
        if provider_province.eq_ignore_ascii_case(addr.province.trim()) {
            return true;
        }
        // translate full names vs codes through the gazetteer entry for the
        // resolved city
        let city = hit.address.city.as_deref().unwrap_or(&addr.city);
        self.gazetteer
            .find_city(city, None)
            .map_or(false, |entry| {
                province_matches(provider_province, entry)
                    && province_matches(&addr.province, entry)
            })
    }

    /// Conservative no-network verdict used when the provider is down.
    fn fuzzy_fallback(&self, addr: &StructuredAddress) -> StructuredOutcome {
        crate::observability::metrics::validation::provider_unavailable();
        let error = FieldError {
            field: "geocoding".to_string(),
            kind: FieldErrorKind::ProviderUnavailable,
            message: "geocoding provider unavailable; result based on gazetteer only".to_string(),
        };

        match self
            .matcher
            .best_match(&self.gazetteer, &addr.city, Some(&addr.province))
        {
            Some(m) => {
                let mut suggestions = Vec::new();
                if normalize_key(&m.entry.city) != normalize_key(&addr.city) {
                    suggestions.push(CorrectionSuggestion {
                        field: "city".to_string(),
                        suggested_value: m.entry.canonical_name.clone(),
                        reason: format!(
                            "\"{}\" is not a known comune; closest match is \"{}\"",
                            addr.city, m.entry.canonical_name
                        ),
                    });
                }
                let normalized = NormalizedAddress {
                    street_line: addr.full_address_hint.clone(),
                    postal_code: addr.postal_code.clone(),
                    city: m.entry.canonical_name.clone(),
                    province: m.entry.province.clone(),
                    country: addr.country.clone(),
                    recipient: addr.recipient.clone(),
                    latitude: None,
                    longitude: None,
                    matched_address: None,
                    source: NormalizedSource::FuzzyFallback,
                };
                StructuredOutcome {
                    evidence: MatchEvidence::FuzzyOnly {
                        similarity: m.similarity,
                    },
                    normalized: Some(normalized),
                    suggestions,
                    errors: vec![error],
                }
            }
            None => StructuredOutcome {
                evidence: MatchEvidence::NoMatch,
                normalized: None,
                suggestions: Vec::new(),
                errors: vec![error],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::GeocodeAddressDetail;
    use crate::error::{Result, ValidatorError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Scripted {
        Hit(GeocodeHit),
        NoMatch,
        Unavailable,
    }

    struct ScriptedGeocoder {
        responses: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
    }

    impl ScriptedGeocoder {
        fn new(responses: Vec<Scripted>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GeocodingPort for ScriptedGeocoder {
        async fn geocode(&self, _query: &GeocodeQuery) -> Result<Option<GeocodeHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                Some(Scripted::Hit(hit)) => Ok(Some(hit)),
                Some(Scripted::NoMatch) | None => Ok(None),
                Some(Scripted::Unavailable) => Err(ValidatorError::ProviderUnavailable(
                    "scripted outage".to_string(),
                )),
            }
        }
    }

    fn hit(cap: &str, city: &str, province: &str) -> GeocodeHit {
        GeocodeHit {
            matched_address: format!("{cap} {city}, Italia"),
            latitude: 41.9,
            longitude: 12.5,
            precision: GeocodePrecision::Locality,
            address: GeocodeAddressDetail {
                postal_code: Some(cap.to_string()),
                city: Some(city.to_string()),
                province: Some(province.to_string()),
            },
            raw_payload: json!({}),
        }
    }

    fn addr(cap: &str, city: &str, province: &str) -> StructuredAddress {
        StructuredAddress {
            postal_code: cap.to_string(),
            city: city.to_string(),
            province: province.to_string(),
            country: "IT".to_string(),
            full_address_hint: None,
            recipient: None,
        }
    }

    fn validator(responses: Vec<Scripted>) -> (StructuredValidator, Arc<ScriptedGeocoder>) {
        let geocoder = Arc::new(ScriptedGeocoder::new(responses));
        let validator = StructuredValidator::new(
            geocoder.clone(),
            Arc::new(Gazetteer::builtin().unwrap()),
            0.5,
            0.8,
        );
        (validator, geocoder)
    }

    #[tokio::test]
    async fn full_agreement_yields_exact_evidence() {
        let (validator, geocoder) = validator(vec![Scripted::Hit(hit("00100", "Roma", "RM"))]);

        let outcome = validator.validate(&addr("00100", "Roma", "RM")).await;
        assert_eq!(outcome.evidence, MatchEvidence::GeocodeExact);
        assert!(outcome.suggestions.is_empty());
        assert!(outcome.errors.is_empty());
        let normalized = outcome.normalized.unwrap();
        assert_eq!(normalized.source, NormalizedSource::Provider);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_disagreement_yields_partial_evidence_and_suggestion() {
        let (validator, _) = validator(vec![Scripted::Hit(hit("00184", "Roma", "RM"))]);

        let outcome = validator.validate(&addr("00100", "Roma", "RM")).await;
        assert_eq!(outcome.evidence, MatchEvidence::GeocodePartial);
        assert_eq!(outcome.suggestions.len(), 1);
        assert_eq!(outcome.suggestions[0].field, "cap");
        assert_eq!(outcome.suggestions[0].suggested_value, "00184");
    }

    #[tokio::test]
    async fn region_precision_never_counts_as_exact() {
        let mut h = hit("00100", "Roma", "RM");
        h.precision = GeocodePrecision::Region;
        let (validator, _) = validator(vec![Scripted::Hit(h)]);

        let outcome = validator.validate(&addr("00100", "Roma", "RM")).await;
        assert_eq!(outcome.evidence, MatchEvidence::GeocodePartial);
    }

    #[tokio::test]
    async fn typo_triggers_single_corrected_retry() {
        let (validator, geocoder) = validator(vec![
            Scripted::NoMatch,
            Scripted::Hit(hit("80100", "Napoli", "NA")),
        ]);

        let outcome = validator.validate(&addr("80100", "Napoliii", "NA")).await;
        match outcome.evidence {
            MatchEvidence::FuzzyCorrectedGeocode { similarity } => {
                assert!(similarity >= 0.8)
            }
            other => panic!("expected fuzzy-corrected evidence, got {:?}", other),
        }
        assert_eq!(outcome.suggestions[0].field, "city");
        assert_eq!(outcome.suggestions[0].suggested_value, "Napoli");
        let normalized = outcome.normalized.unwrap();
        assert_eq!(normalized.source, NormalizedSource::FuzzyCorrected);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_budget_is_one() {
        let (validator, geocoder) = validator(vec![Scripted::NoMatch, Scripted::NoMatch]);

        let outcome = validator.validate(&addr("80100", "Napoliii", "NA")).await;
        assert_eq!(outcome.evidence, MatchEvidence::NoMatch);
        // the suggestion survives even though the retry found nothing
        assert_eq!(outcome.suggestions.len(), 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_city_spends_no_retry() {
        let (validator, geocoder) = validator(vec![Scripted::NoMatch]);

        let outcome = validator.validate(&addr("00100", "Qqqqqq", "XX")).await;
        assert_eq!(outcome.evidence, MatchEvidence::NoMatch);
        assert!(outcome.normalized.is_none());
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outage_degrades_to_gazetteer_verdict() {
        let (validator, geocoder) = validator(vec![Scripted::Unavailable]);

        let outcome = validator.validate(&addr("20121", "Milano", "MI")).await;
        match outcome.evidence {
            MatchEvidence::FuzzyOnly { similarity } => assert_eq!(similarity, 1.0),
            other => panic!("expected fuzzy-only evidence, got {:?}", other),
        }
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, FieldErrorKind::ProviderUnavailable);
        let normalized = outcome.normalized.unwrap();
        assert_eq!(normalized.source, NormalizedSource::FuzzyFallback);
        assert!(normalized.latitude.is_none());
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outage_with_unknown_city_reports_no_match() {
        let (validator, _) = validator(vec![Scripted::Unavailable]);

        let outcome = validator.validate(&addr("00100", "Qqqqqq", "XX")).await;
        assert_eq!(outcome.evidence, MatchEvidence::NoMatch);
        assert!(outcome.normalized.is_none());
        assert_eq!(outcome.errors[0].kind, FieldErrorKind::ProviderUnavailable);
    }
}
