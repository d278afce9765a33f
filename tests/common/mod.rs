//! Test utilities and fixtures for Coursepay integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use async_trait::async_trait;

pub use coursepay::db::{init_db, ledger, queries, AppState, DbPool};
pub use coursepay::error::{AppError, Result};
pub use coursepay::gateways::{
    Gateway, GatewayAdapter, GatewayOrder, GatewayRefund, GatewaySet, OrderRequest, WebhookEvent,
};
pub use coursepay::models::*;

/// Create an in-memory database pool with the schema initialized.
///
/// Capped at one connection: each in-memory SQLite connection is its own
/// database, so a larger pool would hand out empty databases.
pub fn setup_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create test pool");
    {
        let conn = pool.get().expect("Failed to get test connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    pool
}

/// App state with no gateway adapters configured.
pub fn setup_test_state() -> AppState {
    AppState {
        db: setup_test_pool(),
        gateways: Arc::new(GatewaySet::empty()),
    }
}

/// App state with the given adapters installed.
pub fn setup_test_state_with(adapters: Vec<Arc<dyn GatewayAdapter>>) -> AppState {
    let mut set = GatewaySet::empty();
    for adapter in adapters {
        set = set.with_adapter(adapter);
    }
    AppState {
        db: setup_test_pool(),
        gateways: Arc::new(set),
    }
}

/// Create a wallet for `user_id` holding `credits`.
pub fn fund_wallet(state: &AppState, user_id: &str, credits: i64) -> Wallet {
    let mut conn = state.db.get().expect("Failed to get connection");
    let wallet = queries::create_wallet(&conn, user_id, "INR").expect("Failed to create wallet");
    if credits > 0 {
        ledger::add_wallet_credits(&mut conn, user_id, credits, "Test top-up", None)
            .expect("Failed to fund wallet");
    }
    wallet
}

pub fn wallet_credits(state: &AppState, user_id: &str) -> i64 {
    let conn = state.db.get().expect("Failed to get connection");
    queries::get_wallet_by_user(&conn, user_id)
        .expect("Failed to load wallet")
        .expect("Wallet missing")
        .credits
}

pub fn get_payment(state: &AppState, id: &str) -> Payment {
    let conn = state.db.get().expect("Failed to get connection");
    queries::get_payment(&conn, id)
        .expect("Failed to load payment")
        .expect("Payment missing")
}

pub fn get_subscription(state: &AppState, id: &str) -> Subscription {
    let conn = state.db.get().expect("Failed to get connection");
    queries::get_subscription(&conn, id)
        .expect("Failed to load subscription")
        .expect("Subscription missing")
}

pub fn subscription_events(state: &AppState, id: &str) -> Vec<SubscriptionEvent> {
    let conn = state.db.get().expect("Failed to get connection");
    queries::list_subscription_events(&conn, id).expect("Failed to load events")
}

pub fn invoice_for_payment(state: &AppState, payment_id: &str) -> Option<Invoice> {
    let conn = state.db.get().expect("Failed to get connection");
    queries::get_invoice_for_payment(&conn, payment_id).expect("Failed to load invoice")
}

/// A pre-completed gateway payment, as it would look after a verified
/// capture webhook.
pub fn completed_gateway_payment(state: &AppState, gateway: Gateway, amount: i64) -> Payment {
    let conn = state.db.get().expect("Failed to get connection");
    let payment = queries::create_payment(
        &conn,
        &CreatePayment {
            gateway,
            amount,
            currency: "INR".to_string(),
            student_id: "student-1".to_string(),
            description: Some("Test course".to_string()),
            course_id: Some("course-1".to_string()),
            subscription_id: None,
            enrollment_id: None,
            metadata: None,
        },
    )
    .expect("Failed to create payment");
    queries::set_payment_order(&conn, &payment.id, "order_test_1", i64::MAX)
        .expect("Failed to set order");
    queries::mark_payment_completed(&conn, &payment.id, Some("pay_test_1"), "card", true)
        .expect("Failed to complete payment")
        .expect("Payment was not pending")
}

/// Scripted gateway adapter. Records call counts and can be told to fail.
pub struct FakeGateway {
    gateway: Gateway,
    pub order_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    fail_orders: bool,
    fail_refunds: bool,
}

impl FakeGateway {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            order_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
            fail_orders: false,
            fail_refunds: false,
        }
    }

    pub fn failing_orders(gateway: Gateway) -> Self {
        Self {
            fail_orders: true,
            ..Self::new(gateway)
        }
    }

    pub fn failing_refunds(gateway: Gateway) -> Self {
        Self {
            fail_refunds: true,
            ..Self::new(gateway)
        }
    }
}

#[async_trait]
impl GatewayAdapter for FakeGateway {
    fn gateway(&self) -> Gateway {
        self.gateway
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_orders {
            return Err(AppError::Gateway("Scripted order failure".to_string()));
        }
        Ok(GatewayOrder {
            order_id: format!("order_fake_{}", request.receipt),
            raw: serde_json::json!({}),
        })
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: &str) -> Result<bool> {
        Ok(signature == "valid")
    }

    fn parse_webhook(&self, _payload: &[u8]) -> Result<WebhookEvent> {
        Ok(WebhookEvent::Ignored)
    }

    async fn refund(&self, gateway_payment_id: &str, _amount: i64) -> Result<GatewayRefund> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refunds {
            return Err(AppError::Gateway("Scripted refund failure".to_string()));
        }
        Ok(GatewayRefund {
            refund_id: format!("rfnd_fake_{}", gateway_payment_id),
        })
    }
}
