mod schema;
pub mod from_row;
pub mod ledger;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::gateways::GatewaySet;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool and the immutable adapter set.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Gateway adapters, built once at startup and read-only thereafter.
    pub gateways: Arc<GatewaySet>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
