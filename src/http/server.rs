//! HTTP API Server for the federation
//!
//! Exposes the federation as a SPARQL 1.1 protocol endpoint: `GET /sparql?query=`
//! and `POST /sparql` with a form-encoded `query` both return SPARQL JSON results.

use crate::{
    api::{Federation, QueryResponse},
    execution::{
        result_converter::{boolean_to_json, solutions_to_json, SPARQL_RESULTS_JSON},
        QueryInfo,
    },
    FederationError,
};
use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Query parameter or form field carrying the SPARQL text
#[derive(Debug, Deserialize)]
pub struct SparqlRequest {
    pub query: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sources: Vec<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub enum ApiError {
    BadRequest(String),
    Timeout(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::Parse(_) | FederationError::UnsupportedFragment(_) => {
                ApiError::BadRequest(err.to_string())
            }
            FederationError::Timeout { .. } => ApiError::Timeout(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

pub fn create_server(federation: Arc<Federation>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/sparql", get(sparql_get).post(sparql_post))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(federation)
}

/// Health check endpoint
async fn health_check(State(federation): State<Arc<Federation>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        sources: federation.registry().ids().map(ToString::to_string).collect(),
    })
}

/// GET /sparql?query=...
async fn sparql_get(
    State(federation): State<Arc<Federation>>,
    Query(request): Query<SparqlRequest>,
) -> Result<Response, ApiError> {
    run_query(&federation, &request.query).await
}

/// POST /sparql with `application/x-www-form-urlencoded` body
async fn sparql_post(
    State(federation): State<Arc<Federation>>,
    Form(request): Form<SparqlRequest>,
) -> Result<Response, ApiError> {
    run_query(&federation, &request.query).await
}

async fn run_query(federation: &Federation, text: &str) -> Result<Response, ApiError> {
    let (mut document, info) = match federation.query(text).await? {
        QueryResponse::Solutions(stream) => {
            let variables = stream.variables().to_vec();
            let info = Arc::clone(stream.info());
            let rows: Vec<_> = stream.try_collect().await?;
            (solutions_to_json(&variables, &rows), info)
        }
        QueryResponse::Boolean { value, info } => (boolean_to_json(value), info),
    };

    // Partial results are annotated with the sources that failed.
    document["federation"] = annotation(&info);
    Ok(([(header::CONTENT_TYPE, SPARQL_RESULTS_JSON)], document.to_string()).into_response())
}

fn annotation(info: &QueryInfo) -> Value {
    serde_json::to_value(info.snapshot()).unwrap_or(Value::Null)
}

/// Start the HTTP server on the specified address
pub async fn start_server(
    addr: &str,
    federation: Arc<Federation>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(federation);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Federated SPARQL endpoint listening on http://{}", addr);
    println!("Available endpoints:");
    println!("  GET    /sparql?query=...   - Run a federated query");
    println!("  POST   /sparql             - Run a federated query (form field 'query')");
    println!("  GET    /health             - Health check");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}
