use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{msg, OptionExt, Result};
use crate::extractors::{Json, Path};
use crate::models::{CreatePayment as CreatePaymentRequest, CreateRefund, Payment};
use crate::services::payments;

/// Result envelope for payment creation; callers branch on `success`.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_refund_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> (StatusCode, Json<PaymentResponse>) {
    match payments::create_payment(&state, &request).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(PaymentResponse {
                success: true,
                payment_id: Some(receipt.payment_id),
                order_id: receipt.order_id,
                error: None,
            }),
        ),
        Err(e) => (
            e.status(),
            Json(PaymentResponse {
                success: false,
                payment_id: None,
                order_id: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    let payment = queries::get_payment(&conn, &id).or_not_found(msg::PAYMENT_NOT_FOUND)?;
    Ok(Json(payment))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateRefund>,
) -> (StatusCode, Json<RefundResponse>) {
    match payments::process_refund(&state, &id, &request).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(RefundResponse {
                success: true,
                refund_id: Some(receipt.refund_id),
                gateway_refund_id: receipt.gateway_refund_id,
                error: None,
            }),
        ),
        Err(e) => (
            e.status(),
            Json(RefundResponse {
                success: false,
                refund_id: None,
                gateway_refund_id: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}
