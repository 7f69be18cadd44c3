use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use farm_types::api::{CreateProductRequest, MessageResponse, ProductQuery, UpdateProductRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const NOT_FOUND: ApiError = ApiError::NotFound("Product not found");
const INVALID: ApiError = ApiError::BadRequest("Invalid product data");

/// Search when `search` is given, otherwise the active listing.
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<impl IntoResponse> {
    let products = state
        .with_db(ApiError::Internal("Failed to fetch products"), move |db| {
            match query.search.as_deref().filter(|s| !s.is_empty()) {
                Some(search) => db.search_products(search, query.category.as_deref()),
                None => db.get_products(query.limit),
            }
        })
        .await?;
    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .with_db(ApiError::Internal("Failed to fetch product"), move |db| db.get_product(&id))
        .await?
        .ok_or(NOT_FOUND)?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    if !valid_new_product(&req) {
        return Err(INVALID);
    }

    // Unknown seller ids fail the foreign key and land here too
    let product = state.with_db(INVALID, move |db| db.create_product(&req)).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    if !valid_update(&req) {
        return Err(INVALID);
    }

    let product = state
        .with_db(ApiError::Internal("Failed to update product"), move |db| {
            db.update_product(&id, &req)
        })
        .await?
        .ok_or(NOT_FOUND)?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state
        .with_db(ApiError::Internal("Failed to delete product"), move |db| db.delete_product(&id))
        .await?;
    if !deleted {
        return Err(NOT_FOUND);
    }
    Ok(Json(MessageResponse::new("Product deleted successfully")))
}

pub async fn seller_products(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let products = state
        .with_db(ApiError::Internal("Failed to fetch seller products"), move |db| {
            db.get_products_by_seller(&seller_id)
        })
        .await?;
    Ok(Json(products))
}

fn valid_new_product(req: &CreateProductRequest) -> bool {
    !req.name.trim().is_empty()
        && !req.category.trim().is_empty()
        && !req.seller_id.trim().is_empty()
        && valid_price(req.price)
        && req.quantity >= 0
        && (0..=100).contains(&req.discount)
}

fn valid_update(req: &UpdateProductRequest) -> bool {
    req.name.as_deref().is_none_or(|name| !name.trim().is_empty())
        && req.category.as_deref().is_none_or(|c| !c.trim().is_empty())
        && req.price.is_none_or(valid_price)
        && req.quantity.is_none_or(|q| q >= 0)
        && req.discount.is_none_or(|d| (0..=100).contains(&d))
}

fn valid_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}
