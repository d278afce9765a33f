//! Coursepay - payment and subscription core for a course platform
//!
//! This library provides the payment side of the platform: gateway adapters,
//! the payment orchestrator, the wallet ledger bridge and the subscription
//! lifecycle manager, backed by SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod gateways;
pub mod handlers;
pub mod models;
pub mod services;
