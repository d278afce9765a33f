use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use coursepay::config::Config;
use coursepay::db::{create_pool, init_db, ledger, queries, AppState};
use coursepay::gateways::{Gateway, GatewaySet};
use coursepay::handlers;
use coursepay::services::{payments, subscriptions};

#[derive(Parser, Debug)]
#[command(name = "coursepay")]
#[command(about = "Payment and subscription service for a course platform")]
struct Cli {
    /// Seed the database with dev data (a funded wallet and gateway configs from env)
    #[arg(long)]
    seed: bool,

    /// Renew every due subscription, then exit
    #[arg(long)]
    sweep_renewals: bool,

    /// Expire lapsed subscriptions, then exit
    #[arg(long)]
    expire_subscriptions: bool,

    /// Fail pending payments past their deadline, then exit
    #[arg(long)]
    expire_payments: bool,
}

/// Seeds the database with dev data for manual testing: a wallet holding
/// 10000 credits, plus any gateway credentials found in the environment.
/// Only runs in dev mode and only once.
fn seed_dev_data(state: &AppState) {
    let mut conn = state.db.get().expect("Failed to get db connection for seeding");

    if queries::get_wallet_by_user(&conn, "dev-student")
        .expect("Failed to look up dev wallet")
        .is_some()
    {
        tracing::info!("Database already has dev data, skipping seed");
        return;
    }

    queries::create_wallet(&conn, "dev-student", "INR").expect("Failed to create dev wallet");
    ledger::add_wallet_credits(&mut conn, "dev-student", 10_000, "Dev seed credits", None)
        .expect("Failed to fund dev wallet");

    if let (Ok(key_id), Ok(key_secret), Ok(webhook_secret)) = (
        std::env::var("RAZORPAY_KEY_ID"),
        std::env::var("RAZORPAY_KEY_SECRET"),
        std::env::var("RAZORPAY_WEBHOOK_SECRET"),
    ) {
        let config = serde_json::json!({
            "key_id": key_id,
            "key_secret": key_secret,
            "webhook_secret": webhook_secret,
        });
        queries::upsert_gateway_config(&conn, Gateway::Razorpay, &config.to_string(), true)
            .expect("Failed to store razorpay config");
        tracing::info!("Seeded razorpay gateway config from env");
    }

    if let (Ok(secret_key), Ok(webhook_secret)) = (
        std::env::var("STRIPE_SECRET_KEY"),
        std::env::var("STRIPE_WEBHOOK_SECRET"),
    ) {
        let config = serde_json::json!({
            "secret_key": secret_key,
            "webhook_secret": webhook_secret,
        });
        queries::upsert_gateway_config(&conn, Gateway::Stripe, &config.to_string(), true)
            .expect("Failed to store stripe config");
        tracing::info!("Seeded stripe gateway config from env");
    }

    tracing::info!("Dev data seeded: wallet 'dev-student' holds 10000 credits");
}

/// Spawns a background task that periodically fails pending payments whose
/// completion deadline has passed. Runs every 5 minutes.
fn spawn_payment_expiry_task(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            if let Err(e) = payments::expire_pending_payments(&state) {
                tracing::warn!("Pending payment sweep failed: {}", e);
            }
        }
    });

    tracing::info!("Background payment expiry task started (runs every 5 minutes)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursepay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let gateways = {
        let conn = db_pool.get().expect("Failed to get connection");
        GatewaySet::init(&conn).expect("Failed to load gateway configs")
    };

    let state = AppState {
        db: db_pool,
        gateways: Arc::new(gateways),
    };

    // Batch entry points run one sweep and exit without serving.
    if cli.sweep_renewals {
        let report = subscriptions::process_scheduled_renewals(&state)
            .await
            .expect("Renewal sweep failed");
        println!("Renewals: {} processed, {} failed", report.processed, report.failed);
        return;
    }
    if cli.expire_subscriptions {
        let expired =
            subscriptions::expire_subscriptions(&state).expect("Subscription expiry sweep failed");
        println!("Expired {} subscriptions", expired);
        return;
    }
    if cli.expire_payments {
        let swept =
            payments::expire_pending_payments(&state).expect("Payment expiry sweep failed");
        println!("Failed {} stale pending payments", swept);
        return;
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set COURSEPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_payment_expiry_task(state.clone());

    let app = handlers::app(state).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Coursepay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
