use std::collections::HashMap;

use async_trait::async_trait;
use feedline_api_types::{Attachment, Post};
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::application::pagination::{CursorPage, FeedCursor, PageRequest, PaginationError};
use crate::application::repos::{FeedFilter, FeedRepo, RepoError};
use crate::application::feed::MAX_PAGE_SIZE;
use crate::domain::entities::MediaRecord;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::{HydratedPostRow, MediaRow};

impl PostgresRepositories {
    async fn attachments_for(
        &self,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Attachment>>, RepoError> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, MediaRow>(
            "SELECT id, owner_id, post_id, kind, url, created_at FROM media \
             WHERE post_id = ANY($1) ORDER BY created_at, id",
        )
        .bind(post_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for row in rows {
            let media = MediaRecord::try_from(row)?;
            if let Some(post_id) = media.post_id {
                grouped.entry(post_id).or_default().push(Attachment {
                    id: media.id,
                    kind: media.kind,
                    url: media.url,
                });
            }
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<HydratedPostRow>) -> Result<Vec<Post>, RepoError> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut attachments = self.attachments_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let media = attachments.remove(&row.id).unwrap_or_default();
                row.into_post(media)
            })
            .collect()
    }
}

#[async_trait]
impl FeedRepo for PostgresRepositories {
    async fn list_feed(
        &self,
        viewer: Uuid,
        filter: FeedFilter,
        page: PageRequest<FeedCursor>,
    ) -> Result<CursorPage<Post>, RepoError> {
        if page.limit == 0 {
            return Err(PaginationError::InvalidPageSize.into());
        }
        let identity = filter.identity();
        let limit = page.limit.min(MAX_PAGE_SIZE) as i64;

        let mut qb = QueryBuilder::new("");
        Self::push_hydrated_select(&mut qb, viewer);
        Self::apply_feed_filter(&mut qb, filter);

        if let Some(cursor) = page.cursor {
            if cursor.feed() != identity {
                return Err(PaginationError::InvalidCursor(format!(
                    "cursor was issued for feed `{}`, not `{identity}`",
                    cursor.feed()
                ))
                .into());
            }
            qb.push(" AND (p.created_at, p.id) <= (");
            qb.push_bind(cursor.created_at());
            qb.push(", ");
            qb.push_bind(cursor.id());
            qb.push(")");
        }

        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(limit + 1);

        let mut rows = qb
            .build_query_as::<HydratedPostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let next_cursor = if (rows.len() as i64) > limit {
            rows.pop()
                .map(|excluded| FeedCursor::new(identity, excluded.created_at, excluded.id).encode())
        } else {
            None
        };

        let posts = self.hydrate(rows).await?;
        Ok(CursorPage::new(posts, next_cursor))
    }

    async fn find_post(&self, viewer: Uuid, id: Uuid) -> Result<Option<Post>, RepoError> {
        let mut qb = QueryBuilder::new("");
        Self::push_hydrated_select(&mut qb, viewer);
        qb.push(" AND p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<HydratedPostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}
