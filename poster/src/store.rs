//! Post persistence.
//!
//! The core only needs two operations from a store: append a resolved
//! post, and read one window of posts newest-first.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

use crate::db;
use crate::model::{NewPost, Post};
use crate::pagination::PageWindow;

/// One window of posts, plus whether anything lies beyond it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSlice {
    pub posts: Vec<Post>,
    pub more: bool,
}

impl PageSlice {
    /// Build a slice from a read of up to `limit + 1` rows. The extra row
    /// only signals that more posts exist and is dropped.
    pub fn from_overfetch(mut posts: Vec<Post>, limit: u64) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let more = posts.len() > limit;
        posts.truncate(limit);
        Self { posts, more }
    }
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a post, assigning its id and creation time.
    async fn put(&self, post: NewPost) -> Result<Post>;

    /// Read posts in `[offset, offset + limit)`, newest first.
    async fn get_page(&self, window: PageWindow) -> Result<PageSlice>;
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pool = db::init_pool(path.as_ref())
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        Ok(Self { pool })
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn insert_post(conn: &Connection, post: NewPost) -> Result<Post> {
    let media: Vec<&str> = post.media().iter().map(Url::as_str).collect();
    let media = serde_json::to_string(&media)?;
    let created_at = now();
    conn.execute(
        "INSERT INTO posts (body, media, created_at) VALUES (?1, ?2, ?3)",
        params![post.body(), media, created_at],
    )?;
    let id = conn.last_insert_rowid();
    Ok(post.into_post(id, created_at))
}

fn decode_media(raw: &str) -> Result<Vec<Url>> {
    let links: Vec<String> = serde_json::from_str(raw).context("corrupt media column")?;
    links
        .iter()
        .map(|l| Url::parse(l).with_context(|| format!("corrupt media url {l:?}")))
        .collect()
}

fn select_page(conn: &Connection, window: PageWindow) -> Result<PageSlice> {
    let mut stmt = conn.prepare(
        "SELECT id, body, media, created_at FROM posts ORDER BY id DESC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(
        params![
            clamp_i64(window.limit.saturating_add(1)),
            clamp_i64(window.offset)
        ],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    )?;
    let mut posts = Vec::new();
    for row in rows {
        let (id, body, media, created_at) = row?;
        posts.push(Post {
            id,
            body,
            media: decode_media(&media)?,
            created_at,
        });
    }
    Ok(PageSlice::from_overfetch(posts, window.limit))
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn put(&self, post: NewPost) -> Result<Post> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || insert_post(&*pool.get()?, post)).await?
    }

    async fn get_page(&self, window: PageWindow) -> Result<PageSlice> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || select_page(&*pool.get()?, window)).await?
    }
}

/// In-process store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    posts: Mutex<Vec<Post>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.posts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.lock().is_empty()
    }

    /// All posts, oldest first.
    pub fn snapshot(&self) -> Vec<Post> {
        self.posts.lock().clone()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn put(&self, post: NewPost) -> Result<Post> {
        let mut posts = self.posts.lock();
        let id = posts.last().map(|p| p.id).unwrap_or(0) + 1;
        let post = post.into_post(id, now());
        posts.push(post.clone());
        Ok(post)
    }

    async fn get_page(&self, window: PageWindow) -> Result<PageSlice> {
        let skip = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let take = usize::try_from(window.limit.saturating_add(1)).unwrap_or(usize::MAX);
        let posts = self
            .posts
            .lock()
            .iter()
            .rev()
            .skip(skip)
            .take(take)
            .cloned()
            .collect();
        Ok(PageSlice::from_overfetch(posts, window.limit))
    }
}
