mod schema;
pub mod from_row;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::payments::{PaypalClient, StripeClient};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Application state shared across handlers.
///
/// Provider clients are constructed once in `main` and injected here; no
/// handler reaches for ambient globals.
#[derive(Clone)]
pub struct AppState {
    /// Order database pool
    pub db: DbPool,
    /// Card-processor client (pre-authenticated via secret key)
    pub stripe: StripeClient,
    /// PayPal client holding the cached OAuth token
    pub paypal: PaypalClient,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
