//! Postgres-backed repository implementations.

mod feed;
mod notifications;
mod posts;
mod social;
mod types;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::FeedFilter;

const SCHEMA: &str = include_str!("schema.sql");

/// Head of the viewer-relative post projection, continued in `push_hydrated_select`.
const HYDRATED_POST_COLUMNS: &str = "SELECT p.id, p.content, p.created_at, \
     u.id AS author_id, u.username, u.display_name, u.avatar_url, \
     (SELECT COUNT(*) FROM follows f WHERE f.followed_id = u.id) AS followers, \
     EXISTS (SELECT 1 FROM follows f WHERE f.followed_id = u.id AND f.follower_id = ";

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Create any missing tables and indexes. Safe to run on every start.
    pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(pool).await.map(|_| ())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn push_hydrated_select<'q>(qb: &mut QueryBuilder<'q, Postgres>, viewer: uuid::Uuid) {
        qb.push(HYDRATED_POST_COLUMNS);
        qb.push_bind(viewer);
        qb.push(
            ") AS is_followed_by_user, \
             (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes, \
             EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ",
        );
        qb.push_bind(viewer);
        qb.push(
            ") AS is_liked_by_user, \
             EXISTS (SELECT 1 FROM bookmarks b WHERE b.post_id = p.id AND b.user_id = ",
        );
        qb.push_bind(viewer);
        qb.push(
            ") AS is_bookmarked_by_user, \
             (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments \
             FROM posts p INNER JOIN users u ON u.id = p.author_id WHERE 1=1 ",
        );
    }

    fn apply_feed_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: FeedFilter) {
        match filter {
            FeedFilter::All => {}
            FeedFilter::LikedBy(user) => {
                qb.push(" AND EXISTS (SELECT 1 FROM likes fl WHERE fl.post_id = p.id AND fl.user_id = ");
                qb.push_bind(user);
                qb.push(")");
            }
            FeedFilter::AuthoredBy(user) => {
                qb.push(" AND p.author_id = ");
                qb.push_bind(user);
            }
        }
    }
}
