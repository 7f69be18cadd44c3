use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use farm_types::api::{AddToCartRequest, MessageResponse, UpdateCartItemRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const NOT_FOUND: ApiError = ApiError::NotFound("Cart item not found");
const INVALID: ApiError = ApiError::BadRequest("Invalid cart item data");

pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let items = state
        .with_db(ApiError::Internal("Failed to fetch cart items"), move |db| {
            db.get_cart_items(&user_id)
        })
        .await?;
    Ok(Json(items))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    payload: Result<Json<AddToCartRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    if req.user_id.trim().is_empty() || req.product_id.trim().is_empty() || req.quantity < 1 {
        return Err(INVALID);
    }

    let item = state.with_db(INVALID, move |db| db.add_to_cart(&req)).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCartItemRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    if req.quantity < 1 {
        return Err(INVALID);
    }

    let item = state
        .with_db(ApiError::Internal("Failed to update cart item"), move |db| {
            db.update_cart_item(&id, req.quantity)
        })
        .await?
        .ok_or(NOT_FOUND)?;
    Ok(Json(item))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .with_db(ApiError::Internal("Failed to remove cart item"), move |db| {
            db.remove_from_cart(&id)
        })
        .await?;
    if !removed {
        return Err(NOT_FOUND);
    }
    Ok(Json(MessageResponse::new("Item removed from cart")))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .with_db(ApiError::Internal("Failed to clear cart"), move |db| db.clear_cart(&user_id))
        .await?;
    Ok(Json(MessageResponse::new("Cart cleared successfully")))
}
