use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use farm_types::api::{CreateOrderRequest, OrderQuery, UpdateOrderStatusRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const INVALID: ApiError = ApiError::BadRequest("Invalid order data");

/// `customerId` wins over `sellerId` when both are given.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<impl IntoResponse> {
    let orders = state
        .with_db(ApiError::Internal("Failed to fetch orders"), move |db| {
            match (query.customer_id, query.seller_id) {
                (Some(customer_id), _) => db.get_orders_by_customer(&customer_id),
                (None, Some(seller_id)) => db.get_orders_by_seller(&seller_id),
                (None, None) => db.get_orders(),
            }
        })
        .await?;
    Ok(Json(orders))
}

pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    let valid = !req.customer_id.trim().is_empty()
        && !req.seller_id.trim().is_empty()
        && !req.product_id.trim().is_empty()
        && req.quantity > 0
        && req.total_price.is_finite()
        && req.total_price >= 0.0
        && req.discount_amount.is_finite()
        && req.discount_amount >= 0.0;
    if !valid {
        return Err(INVALID);
    }

    let order = state.with_db(INVALID, move |db| db.create_order(&req)).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Unknown status names fail to decode and are answered with 400.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| ApiError::BadRequest("Invalid order status"))?;
    let order = state
        .with_db(ApiError::Internal("Failed to update order status"), move |db| {
            db.update_order_status(&id, req.status)
        })
        .await?
        .ok_or(ApiError::NotFound("Order not found"))?;
    Ok(Json(order))
}
