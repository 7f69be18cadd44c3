use axum::{Json, extract::State, response::IntoResponse};

use farm_types::api::HealthResponse;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state
        .with_db(ApiError::Internal("Failed to fetch admin stats"), |db| db.get_stats())
        .await?;
    Ok(Json(stats))
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
