use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS slots (
        id TEXT PRIMARY KEY,
        provider_id TEXT NOT NULL UNIQUE,
        date TEXT NOT NULL,
        sitting TEXT NOT NULL,
        description TEXT NOT NULL,
        price REAL,
        available INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS listings (
        id TEXT PRIMARY KEY,
        slot_id TEXT NOT NULL REFERENCES slots(id),
        seller_id TEXT NOT NULL,
        status TEXT NOT NULL,
        price REAL NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        sold_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status)",
    "CREATE INDEX IF NOT EXISTS idx_listings_seller ON listings(seller_id)",
    "CREATE INDEX IF NOT EXISTS idx_listings_slot ON listings(slot_id)",
    "CREATE TABLE IF NOT EXISTS claims (
        id TEXT PRIMARY KEY,
        listing_id TEXT NOT NULL REFERENCES listings(id),
        buyer_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        deadline INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_claims_status_deadline ON claims(status, deadline)",
    "CREATE INDEX IF NOT EXISTS idx_claims_listing ON claims(listing_id)",
    "CREATE TABLE IF NOT EXISTS sync_cursor (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        finished_at INTEGER NOT NULL,
        slot_count INTEGER NOT NULL,
        outcome TEXT NOT NULL,
        detail TEXT
    )",
];

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Sqlite>,
}

impl DbClient {
    pub async fn new(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        info!("Ensuring database schema");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}
