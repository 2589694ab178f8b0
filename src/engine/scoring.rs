use chrono::Utc;

use crate::domain::ValidationResult;
use crate::engine::structured::{MatchEvidence, StructuredOutcome};

/// Which resolution path produced the evidence being scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionPath {
    Structured,
    AiExtraction { extraction_confidence: f64 },
}

// Confidence tiers, most to least trusted. The fuzzy-only tier tops out
// below the validity threshold: a degraded fallback never auto-validates.
const EXACT_TIER: f64 = 0.95;
const PARTIAL_TIER: f64 = 0.78;
const FUZZY_CORRECTED_BASE: f64 = 0.68;
const FUZZY_CORRECTED_SPAN: f64 = 0.07;
const FUZZY_ONLY_CAP: f64 = 0.55;
const NO_MATCH_CONFIDENCE: f64 = 0.1;

// Floor of the scale applied to AI-derived evidence; the model's own
// confidence moves it from here up to 1.0.
const AI_SCALE_BASE: f64 = 0.7;

/// Collapses a structured outcome, from either resolution path, into the
/// final confidence-scored verdict. Total: never raises.
pub struct ConfidenceScorer {
    validity_threshold: f64,
}

impl ConfidenceScorer {
    pub fn new(validity_threshold: f64) -> Self {
        Self { validity_threshold }
    }

    pub fn score(&self, outcome: StructuredOutcome, path: ResolutionPath) -> ValidationResult {
        let base = match outcome.evidence {
            MatchEvidence::GeocodeExact => EXACT_TIER,
            MatchEvidence::GeocodePartial => PARTIAL_TIER,
            MatchEvidence::FuzzyCorrectedGeocode { similarity } => {
                FUZZY_CORRECTED_BASE + FUZZY_CORRECTED_SPAN * similarity.clamp(0.0, 1.0)
            }
            MatchEvidence::FuzzyOnly { similarity } => {
                FUZZY_ONLY_CAP * similarity.clamp(0.0, 1.0)
            }
            MatchEvidence::NoMatch => NO_MATCH_CONFIDENCE,
        };

        let scale = match path {
            ResolutionPath::Structured => 1.0,
            ResolutionPath::AiExtraction {
                extraction_confidence,
            } => AI_SCALE_BASE + (1.0 - AI_SCALE_BASE) * extraction_confidence.clamp(0.0, 1.0),
        };

        let confidence = (base * scale).clamp(0.0, 1.0);
        let is_valid = confidence >= self.validity_threshold && outcome.normalized.is_some();

        let mut suggestions = outcome.suggestions;
        suggestions.sort_by_key(|s| std::cmp::Reverse(field_impact(&s.field)));

        crate::observability::metrics::validation::confidence_recorded(confidence);

        ValidationResult {
            is_valid,
            normalized: outcome.normalized,
            confidence,
            suggestions,
            errors: outcome.errors,
            validated_at: Utc::now(),
        }
    }
}

/// Relative impact of correcting each field, for suggestion ordering.
fn field_impact(field: &str) -> u8 {
    match field {
        "city" => 3,
        "province" => 2,
        "cap" => 1,
        _ => 0,
    }
}
