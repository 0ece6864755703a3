use crate::error::{Result, ScraperError};
use crate::pipeline::{Pipeline, Trigger};
use crate::service::EventService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EventService>,
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn method_not_allowed(method: &Method, allow: &'static str) -> Response {
    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &format!("Method {} Not Allowed", method),
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

async fn get_only(method: Method) -> Response {
    method_not_allowed(&method, "GET")
}

async fn post_only(method: Method) -> Response {
    method_not_allowed(&method, "POST")
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "sydney-events",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}

async fn list_events(State(state): State<AppState>) -> Response {
    match state.service.list_events().await {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            error!("Failed to list events: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}

async fn subscribe(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SubscribeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected subscribe body: {}", rejection);
            return error_response(StatusCode::BAD_REQUEST, "Missing data");
        }
    };

    let email = request.email.unwrap_or_default();
    let event_id = request.event_id.unwrap_or_default();
    match state.service.subscribe(&email, &event_id).await {
        Ok(redirect_url) => Json(json!({ "redirectUrl": redirect_url })).into_response(),
        Err(e @ (ScraperError::MissingFields | ScraperError::AlreadySubscribed)) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e @ ScraperError::EventNotFound) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        Err(e) => {
            error!("Subscription failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}

async fn trigger_scrape(State(state): State<AppState>) -> Response {
    // the run is its own task; it finishes and closes its sessions even if
    // the request is dropped
    let pipeline = state.pipeline.clone();
    let run = tokio::spawn(async move { pipeline.run(Trigger::Manual).await });

    match run.await {
        Ok(Ok(report)) => Json(json!({
            "message": "Scraping completed",
            "report": report,
        }))
        .into_response(),
        Ok(Err(e)) => {
            error!("Manual scrape failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Scraping failed")
        }
        Err(e) => {
            error!("Manual scrape task aborted: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Scraping failed")
        }
    }
}

async fn scrape_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.state())
}

fn cors_layer(allowed_origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(allowed_origin).map_err(|e| {
        ScraperError::Config(format!("invalid allowed origin '{}': {}", allowed_origin, e))
    })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

/// Create the HTTP router with the API, health and metrics routes
pub fn create_server(state: AppState, allowed_origin: &str) -> Result<Router> {
    let cors = cors_layer(allowed_origin)?;

    Ok(Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api/events", get(list_events).fallback(get_only))
        .route("/api/subscribe", post(subscribe).fallback(post_only))
        .route("/api/scrape", post(trigger_scrape).fallback(post_only))
        .route("/api/scrape/status", get(scrape_status).fallback(get_only))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16, allowed_origin: &str) -> anyhow::Result<()> {
    let app = create_server(state, allowed_origin)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{}", port);
    info!("Events API: http://localhost:{}/api/events", port);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
