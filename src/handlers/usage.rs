use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{UsageQuery, UsageResponse};
use crate::state::AppState;

pub async fn usage_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageResponse>, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_USER_ID"))?;

    let record = state.ledger.get_or_init(&user_id);
    let quota = state.ledger.check_quota(&record);

    Ok(Json(UsageResponse {
        is_pro: record.is_entitled,
        remaining: quota.remaining,
        daily_limit: state.ledger.daily_limit(),
    }))
}
