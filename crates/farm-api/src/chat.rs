use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use farm_types::api::HistoryQuery;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// The whole conversation between two identities, oldest first. The path
/// order does not matter.
pub async fn get_history(
    State(state): State<AppState>,
    Path((sender_id, receiver_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .with_db(ApiError::Internal("Failed to fetch chat messages"), move |db| {
            db.get_chat_messages(&sender_id, &receiver_id, query.limit)
        })
        .await?;
    Ok(Json(messages))
}
