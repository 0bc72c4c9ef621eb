use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::api::ErrorResponse;
use crate::app::AppState;
use crate::store::models::StatusReport;

/// GET /status（および /countries/status）
///
/// `total_countries` は保存値ではなく参照時の集計。リフレッシュ前は
/// `{total_countries: 0, last_refreshed_at: null}` を返す。
pub(crate) async fn report(State(state): State<AppState>) -> impl IntoResponse {
    let dao = state.dao();

    let total_countries = match dao.count_countries().await {
        Ok(count) => count,
        Err(e) => {
            error!(error = ?e, "failed to count countries");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response();
        }
    };

    match dao.last_refreshed_at().await {
        Ok(last_refreshed_at) => (
            StatusCode::OK,
            Json(StatusReport {
                total_countries,
                last_refreshed_at,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = ?e, "failed to read refresh status");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response()
        }
    }
}
