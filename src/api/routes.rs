use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::collections::HashMap;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::models::ProgramsResponse;
use crate::api::response;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::preferences::Preferences;
use crate::search::build_digest;
use crate::{extract, programs, search, AppState};

const ALLOWED_METHODS: &str = "GET, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/programs", get(programs_handler))
        .route("/health", get(health))
        .layer(CatchPanicLayer::custom(panic_response))
        // Answers every OPTIONS request itself; handlers never see one.
        .layer(
            CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        // CorsLayer only puts these on OPTIONS replies; GET replies need them too.
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .with_state(app_state)
}

async fn health() -> Response {
    response::success(&serde_json::json!({ "ok": true }))
}

async fn programs_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let start_time = Instant::now();
    let prefs = Preferences::from_query(&params);
    tracing::info!(
        field = %prefs.field,
        state = %prefs.state,
        stem_only = prefs.stem_only,
        extraction = prefs.extraction_enabled,
        "processing programs request"
    );

    // Dropping this future (caller gone, or timeout) cancels any upstream call in flight.
    let result = tokio::time::timeout(
        state.config.request_timeout,
        process_programs_request(&state.config, &prefs),
    )
    .await;
    let elapsed_ms = start_time.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(body)) => {
            tracing::info!(count = body.count, elapsed_ms, "programs request succeeded");
            response::success(&body)
        }
        Ok(Err(err)) => {
            tracing::warn!(status = err.status().as_u16(), error = %err, elapsed_ms, "programs request failed");
            err.into_response()
        }
        Err(_) => {
            tracing::warn!(elapsed_ms, "programs request timed out");
            AppError::Timeout.into_response()
        }
    }
}

async fn process_programs_request(config: &Config, prefs: &Preferences) -> Result<ProgramsResponse> {
    let found = search::search(config, prefs).await?;
    let digest = build_digest(&found.snippets);

    let extraction = extract::extract(config, prefs, &found.query, &digest).await?;
    tracing::info!(outcome = extraction.label(), "extraction finished");

    programs::assemble(prefs, &found, extraction, config.require_structured)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%message, "handler panicked");
    AppError::Internal(message).into_response()
}
