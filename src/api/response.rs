use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::api::models::ErrorResponse;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let content_type = [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))];
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, content_type, bytes).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize response body");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                content_type,
                r#"{"ok":false,"error":"failed to serialize response"}"#,
            )
                .into_response()
        }
    }
}

pub fn success<T: Serialize>(data: &T) -> Response {
    json(StatusCode::OK, data)
}

pub fn error(status: StatusCode, message: String) -> Response {
    json(
        status,
        &ErrorResponse {
            ok: false,
            error: message,
        },
    )
}
