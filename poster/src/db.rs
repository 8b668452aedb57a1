use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

/// Open a connection pool on the database file and run migrations.
pub fn init_pool<P: AsRef<Path>>(path: P) -> Result<Pool<SqliteConnectionManager>> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::new(manager)?;
    pool.get()?.execute_batch(SCHEMA)?;
    Ok(pool)
}

/// Posts are keyed by an autoincrementing id, which doubles as the
/// creation order. Media URLs are a JSON array in display order.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  body TEXT NOT NULL,
  media TEXT NOT NULL DEFAULT '[]',
  created_at INTEGER NOT NULL
);
"#;
