// aegis-push/src/server.rs

use crate::dispatch::{self, Dispatcher};
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, instrument};

/// Safari only sends small JSON bodies; the push endpoint takes a short form.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::DELETE, Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_check_handler))
        .fallback(dispatch_handler)
        .with_state(dispatcher)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
}

async fn health_check_handler() -> &'static str {
    "ok"
}

#[instrument(skip_all, fields(%method, path = %uri.path()))]
async fn dispatch_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let request = dispatch::Request {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        content_type: header_value(header::CONTENT_TYPE),
        authorization: header_value(header::AUTHORIZATION),
        body: body.to_vec(),
    };

    // Package builds are synchronous file and crypto work.
    let response = tokio::task::spawn_blocking(move || dispatcher.handle(&request)).await?;
    Ok((response.status, response.headers, response.body).into_response())
}

struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let anyhow_err = err.into();
        error!(error = %anyhow_err, "An internal application error occurred.");
        Self(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    }
}
