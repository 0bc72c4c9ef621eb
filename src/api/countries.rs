use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::ErrorResponse;
use crate::app::AppState;
use crate::pipeline::RefreshError;
use crate::store::models::{CountryFilters, CountrySort};

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    region: Option<String>,
    currency: Option<String>,
    sort: Option<String>,
}

impl ListQuery {
    fn into_filters(self) -> CountryFilters {
        CountryFilters {
            region: self.region,
            currency: self.currency,
            // Unknown sort values are ignored, matching the reference surface.
            sort: match self.sort.as_deref() {
                Some("gdp_desc") => Some(CountrySort::GdpDesc),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    message: &'static str,
    countries: usize,
}

/// POST /countries/refresh
///
/// パイプライン全体を同期実行する。フェッチ失敗は 503、それ以外の内部
/// 失敗は 500 を返す。
pub(crate) async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline().run().await {
        Ok(report) => {
            info!(countries = report.countries, "manual refresh completed");
            (
                StatusCode::OK,
                Json(RefreshResponse {
                    message: "Countries refreshed successfully",
                    countries: report.countries,
                }),
            )
                .into_response()
        }
        Err(RefreshError::SourceUnavailable(source)) => {
            error!(error = ?source, "refresh aborted: upstream source failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::with_details(
                    "External data source unavailable",
                    format!("{source:#}"),
                ),
            )
                .into_response()
        }
        Err(error) => {
            // Storage/render detail stays in the logs, not the response.
            error!(error = ?error, "refresh failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response()
        }
    }
}

/// GET /countries
pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let filters = query.into_filters();
    match state.dao().list_countries(&filters).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => {
            error!(error = ?e, "failed to list countries");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response()
        }
    }
}

/// GET /countries/{name}
pub(crate) async fn get_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.dao().find_country(&name).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new("Country not found"),
        )
            .into_response(),
        Err(e) => {
            error!(error = ?e, country = %name, "failed to fetch country");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response()
        }
    }
}

/// DELETE /countries/{name}
///
/// 対象が存在しない場合も成功として扱う（204）。
pub(crate) async fn delete_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.dao().delete_country(&name).await {
        Ok(removed) => {
            info!(country = %name, removed, "delete country");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(error = ?e, country = %name, "failed to delete country");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Internal server error"),
            )
                .into_response()
        }
    }
}
