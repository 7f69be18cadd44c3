use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use farm_types::api::{CreateUserRequest, UpdateUserRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const NOT_FOUND: ApiError = ApiError::NotFound("User not found");
const INVALID: ApiError = ApiError::BadRequest("Invalid user data");

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    if !valid_email(&req.email) || req.name.trim().is_empty() {
        return Err(INVALID);
    }

    let user = state.with_db(INVALID, move |db| db.create_user(&req)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .with_db(ApiError::Internal("Failed to fetch user"), move |db| db.get_user(&id))
        .await?
        .ok_or(NOT_FOUND)?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|_| INVALID)?;
    let valid = req.email.as_deref().is_none_or(valid_email)
        && req.name.as_deref().is_none_or(|name| !name.trim().is_empty());
    if !valid {
        return Err(INVALID);
    }

    let user = state
        .with_db(ApiError::Internal("Failed to update user"), move |db| {
            db.update_user(&id, &req)
        })
        .await?
        .ok_or(NOT_FOUND)?;
    Ok(Json(user))
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}
