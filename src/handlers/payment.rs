use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;
use tracing::error;

use crate::error::{ApiError, PaymentError};
use crate::models::{CreateOrderRequest, CreateOrderResponse, VerifyPaymentRequest, VerifyPaymentResponse};
use crate::state::AppState;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let key = state
        .payments
        .key_id()
        .ok_or(PaymentError::NotConfigured)?
        .to_string();

    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let user_id = non_empty(request.user_id).ok_or_else(|| ApiError::bad_request("MISSING_USER_ID"))?;

    let order = state.payments.create_order(&user_id).await.map_err(|e| {
        error!(error = %e, user_id = %user_id, "payment order creation failed");
        ApiError::from(e)
    })?;

    Ok(Json(CreateOrderResponse {
        key,
        amount: order.amount,
        currency: order.currency,
        order_id: order.id,
    }))
}

pub async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let missing = || ApiError::bad_request("MISSING_FIELDS");

    let user_id = non_empty(request.user_id).ok_or_else(missing)?;
    let order_id = non_empty(request.order_id).ok_or_else(missing)?;
    let payment_id = non_empty(request.payment_id).ok_or_else(missing)?;
    let signature = non_empty(request.signature).ok_or_else(missing)?;

    state
        .verifier
        .verify(&user_id, &order_id, &payment_id, &signature)?;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        is_pro: true,
    }))
}
