use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Json as AxumJson, Router,
};
use hyper::Server;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::app::validate_use_case::ValidateAddressUseCase;
use crate::domain::{
    AddressInput, CorrectionSuggestion, FieldError, NormalizedAddress, ValidateAddressBody,
    ValidationResult,
};
use crate::error::ValidatorError;

/// Wire shape of the 200 response for `POST /validate-address`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAddressResponse {
    pub success: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizedAddress>,
    pub confidence: f64,
    pub suggestions: Vec<CorrectionSuggestion>,
    pub errors: Vec<FieldError>,
}

impl From<ValidationResult> for ValidateAddressResponse {
    fn from(result: ValidationResult) -> Self {
        Self {
            success: result.errors.is_empty(),
            is_valid: result.is_valid,
            normalized: result.normalized,
            confidence: result.confidence,
            suggestions: result.suggestions,
            errors: result.errors,
        }
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "addr-validator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Capability descriptor for `GET /validate-address`. Static, no business
/// logic.
async fn describe_validate_address() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "addr-validator",
        "status": "ready",
        "features": [
            "structured validation (cap/city/province) with geocoding cross-check",
            "fuzzy city and province correction against the comuni gazetteer",
            "freeform address extraction via generative text model",
            "confidence scoring with corrective suggestions"
        ],
        "usage": {
            "structured": { "cap": "00100", "city": "Roma", "province": "RM", "country": "IT" },
            "raw": { "rawAddress": "Via Roma 5, 20100 Milano MI" }
        }
    }))
}

async fn validate_address(
    use_case: Arc<ValidateAddressUseCase>,
    body: ValidateAddressBody,
) -> axum::response::Response {
    let input = match AddressInput::from_body(&body, use_case.default_country()) {
        Ok(input) => input,
        Err(e @ ValidatorError::MissingFields(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "request dispatch failed unexpectedly");
            return internal_error();
        }
    };

    let result = use_case.validate(input).await;
    Json(ValidateAddressResponse::from(result)).into_response()
}

/// Generic 500; internal details stay in the server logs.
fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": "internal error",
            "details": "unexpected failure while validating the address"
        })),
    )
        .into_response()
}

/// Create the HTTP server with all routes
pub fn create_server(use_case: Arc<ValidateAddressUseCase>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(
            "/validate-address",
            post({
                let uc = use_case.clone();
                move |AxumJson(body): AxumJson<ValidateAddressBody>| {
                    let uc = uc.clone();
                    async move { validate_address(uc, body).await }
                }
            })
            .get(describe_validate_address),
        )
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    use_case: Arc<ValidateAddressUseCase>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(use_case);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("📦 Validate:     http://localhost:{port}/validate-address");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
