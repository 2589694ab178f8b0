//! Metric recording helpers for the validation engine, using standard
//! Prometheus naming conventions. Recording is a no-op until a recorder is
//! installed by the deployment.

/// Metrics emitted per validation request.
pub mod validation {
    /// A structured-mode request entered the engine.
    pub fn structured_request() {
        ::metrics::counter!("addr_validation_requests_structured_total").increment(1);
    }

    /// A raw-mode (AI extraction) request entered the engine.
    pub fn raw_request() {
        ::metrics::counter!("addr_validation_requests_raw_total").increment(1);
    }

    /// Final verdict for a request.
    pub fn result_recorded(is_valid: bool) {
        if is_valid {
            ::metrics::counter!("addr_validation_results_valid_total").increment(1);
        } else {
            ::metrics::counter!("addr_validation_results_invalid_total").increment(1);
        }
    }

    /// Final confidence for a request.
    pub fn confidence_recorded(confidence: f64) {
        ::metrics::histogram!("addr_validation_confidence").record(confidence);
    }

    /// A fuzzy-corrected geocode retry was spent.
    pub fn geocode_retry() {
        ::metrics::counter!("addr_validation_geocode_retries_total").increment(1);
    }

    /// The geocoding provider failed or timed out.
    pub fn provider_unavailable() {
        ::metrics::counter!("addr_validation_geocode_unavailable_total").increment(1);
    }

    /// The text model response failed the strict extraction parse.
    pub fn ai_parse_failure() {
        ::metrics::counter!("addr_validation_ai_parse_failures_total").increment(1);
    }

    /// The text model call itself failed.
    pub fn ai_call_failed() {
        ::metrics::counter!("addr_validation_ai_call_failures_total").increment(1);
    }

    /// A raw request arrived with no extraction credentials configured.
    pub fn ai_unconfigured() {
        ::metrics::counter!("addr_validation_ai_unconfigured_total").increment(1);
    }
}
