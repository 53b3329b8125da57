//! Server-side feed resolution: identity filter plus the shared keyset paginator.

use std::sync::Arc;

use feedline_api_types::PostsPage;
use tracing::{debug, warn};

use crate::application::error::FeedError;
use crate::application::pagination::{FeedCursor, PageRequest};
use crate::application::repos::{FeedFilter, FeedRepo};
use crate::application::session::SessionUser;
use crate::domain::types::FeedIdentity;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Clone)]
pub struct FeedService {
    repo: Arc<dyn FeedRepo>,
    default_page_size: u32,
}

impl FeedService {
    pub fn new(repo: Arc<dyn FeedRepo>) -> Self {
        Self {
            repo,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    /// Resolve one page of `identity` for `viewer`.
    ///
    /// An unusable cursor does not fail the feed: the first page is served
    /// with `restarted` set. An empty result is a valid page.
    pub async fn resolve(
        &self,
        viewer: Option<&SessionUser>,
        identity: FeedIdentity,
        cursor: Option<&str>,
        page_size: Option<u32>,
    ) -> Result<PostsPage, FeedError> {
        let viewer = viewer.ok_or(FeedError::Unauthorized)?;
        let limit = page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, MAX_PAGE_SIZE);

        let (cursor, restarted) = match self.decode_cursor(&identity, cursor) {
            Ok(cursor) => (cursor, false),
            Err(err) => {
                warn!(feed = %identity, error = %err, "restarting feed from the top");
                (None, true)
            }
        };

        let page = self
            .repo
            .list_feed(
                viewer.id,
                FeedFilter::from(identity),
                PageRequest::new(limit, cursor),
            )
            .await?;

        debug!(
            feed = %identity,
            viewer = %viewer.id,
            returned = page.items.len(),
            has_more = page.next_cursor.is_some(),
            "feed page resolved"
        );

        Ok(PostsPage {
            posts: page.items,
            next_cursor: page.next_cursor,
            restarted,
        })
    }

    fn decode_cursor(
        &self,
        identity: &FeedIdentity,
        cursor: Option<&str>,
    ) -> Result<Option<FeedCursor>, FeedError> {
        cursor
            .filter(|raw| !raw.is_empty())
            .map(|raw| FeedCursor::decode_for(raw, identity))
            .transpose()
            .map_err(FeedError::from)
    }
}
