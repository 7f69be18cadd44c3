use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use farm_types::api::CreateDiscountCodeRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const INVALID: ApiError = ApiError::BadRequest("Invalid discount code data");

/// Validate a code at checkout: unknown or inactive is 404, expired is 400.
pub async fn validate_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let discount = state
        .with_db(ApiError::Internal("Failed to validate discount code"), move |db| {
            db.get_discount_code(&code)
        })
        .await?
        .ok_or(ApiError::NotFound("Invalid discount code"))?;

    if discount.is_expired_at(Utc::now()) {
        return Err(ApiError::BadRequest("Discount code has expired"));
    }
    Ok(Json(discount))
}

pub async fn create_code(
    State(state): State<AppState>,
    payload: Result<Json<CreateDiscountCodeRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    if req.code.trim().is_empty() || !(1..=100).contains(&req.discount) {
        return Err(INVALID);
    }

    // Duplicate codes violate the unique constraint
    let discount = state.with_db(INVALID, move |db| db.create_discount_code(&req)).await?;
    Ok((StatusCode::CREATED, Json(discount)))
}
