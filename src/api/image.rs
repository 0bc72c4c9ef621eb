use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::error;

use crate::api::ErrorResponse;
use crate::app::AppState;

/// GET /countries/image
///
/// 単一キャッシュスロットの PNG を返す。最初のリフレッシュ前は 404。
pub(crate) async fn summary(State(state): State<AppState>) -> impl IntoResponse {
    let path = state.pipeline().summary_image_path();

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/png")],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new("Summary image not found"),
        )
            .into_response(),
        Err(e) => {
            error!(error = ?e, path = %path.display(), "failed to read summary image");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response()
        }
    }
}
