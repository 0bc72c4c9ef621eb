pub(crate) mod countries;
pub(crate) mod health;
pub(crate) mod image;
pub(crate) mod status;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/countries/refresh", post(countries::refresh))
        .route("/countries", get(countries::list))
        .route("/countries/image", get(image::summary))
        .route("/countries/status", get(status::report))
        // Top-level alias, same payload as /countries/status.
        .route("/status", get(status::report))
        .route(
            "/countries/{name}",
            get(countries::get_by_name).delete(countries::delete_by_name),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ErrorResponse {
    pub(crate) fn new(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: error.into(),
            details: None,
        })
    }

    pub(crate) fn with_details(
        error: impl Into<String>,
        details: impl Into<String>,
    ) -> Json<Self> {
        Json(Self {
            error: error.into(),
            details: Some(details.into()),
        })
    }
}
