mod from_row;
pub mod migrations;
pub mod queries;
mod schema;

pub use from_row::{FromRow, query_all, query_one};
pub use migrations::{MigrationError, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::activation::CourseActivation;
use crate::jwt::TokenService;
use crate::payments::MercadoPagoClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub app_name: String,
    /// Public URL of this server (provider back URLs, webhook URL)
    pub base_url: String,
    /// Where the browser is sent after a payment redirect
    pub frontend_url: String,
    pub tokens: TokenService,
    pub mercadopago: MercadoPagoClient,
    pub activation: Arc<dyn CourseActivation>,
}

/// Per-connection setup: enforce foreign keys and wait on a locked database
/// instead of failing immediately.
fn configure_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(configure_connection);
    Pool::builder().max_size(10).build(manager)
}

/// Pool over a named shared-cache in-memory database. All connections see the
/// same data for as long as at least one of them stays open.
pub fn create_memory_pool(name: &str) -> Result<DbPool, r2d2::Error> {
    let uri = format!("file:{}?mode=memory&cache=shared", name);
    let manager = SqliteConnectionManager::file(uri)
        .with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )
        .with_init(configure_connection);
    Pool::builder().max_size(4).min_idle(Some(1)).build(manager)
}
