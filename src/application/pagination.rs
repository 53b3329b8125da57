//! Shared keyset pagination for every feed.
//!
//! Feeds are ordered by `(created_at DESC, id DESC)`. A page is fetched by
//! reading `limit + 1` items at or below the cursor key; the extra item, when
//! present, becomes the next cursor and is left out of the page.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use feedline_api_types::Post;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::PostRecord;
use crate::domain::types::FeedIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FeedCursorPayload {
    feed: FeedIdentity,
    created_at: OffsetDateTime,
    id: Uuid,
}

/// Position of an item in feed order.
///
/// Compares ascending; feeds walk it from the largest key down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub created_at: OffsetDateTime,
    pub id: Uuid,
}

impl SortKey {
    pub fn new(created_at: OffsetDateTime, id: Uuid) -> Self {
        Self { created_at, id }
    }
}

/// Items that can be placed in feed order.
pub trait Keyed {
    fn sort_key(&self) -> SortKey;
}

impl Keyed for Post {
    fn sort_key(&self) -> SortKey {
        SortKey::new(self.created_at, self.id)
    }
}

impl Keyed for PostRecord {
    fn sort_key(&self) -> SortKey {
        SortKey::new(self.created_at, self.id)
    }
}

/// Resume token naming the first item a previous page excluded.
///
/// The token is bound to the feed that produced it and carries the full sort
/// key, so it stays usable after the item it names is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    feed: FeedIdentity,
    created_at: OffsetDateTime,
    id: Uuid,
}

impl FeedCursor {
    pub fn new(feed: FeedIdentity, created_at: OffsetDateTime, id: Uuid) -> Self {
        Self {
            feed,
            created_at,
            id,
        }
    }

    /// Cursor resuming at `item` within `feed`.
    pub fn at(feed: FeedIdentity, item: &impl Keyed) -> Self {
        let key = item.sort_key();
        Self::new(feed, key.created_at, key.id)
    }

    pub fn feed(&self) -> FeedIdentity {
        self.feed
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey::new(self.created_at, self.id)
    }

    pub fn encode(&self) -> String {
        let payload = FeedCursorPayload {
            feed: self.feed,
            created_at: self.created_at,
            id: self.id,
        };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing feed cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: FeedCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            feed: payload.feed,
            created_at: payload.created_at,
            id: payload.id,
        })
    }

    /// Decode a cursor and require that it was issued by `feed`.
    pub fn decode_for(cursor: &str, feed: &FeedIdentity) -> Result<Self, PaginationError> {
        let decoded = Self::decode(cursor)?;
        decoded.ensure_feed(feed)?;
        Ok(decoded)
    }

    fn ensure_feed(&self, feed: &FeedIdentity) -> Result<(), PaginationError> {
        if &self.feed != feed {
            return Err(PaginationError::InvalidCursor(format!(
                "cursor was issued for feed `{}`, not `{feed}`",
                self.feed
            )));
        }
        Ok(())
    }
}

/// Cursor-aware pagination request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<C> {
    pub limit: u32,
    pub cursor: Option<C>,
}

impl<C> PageRequest<C> {
    pub fn new(limit: u32, cursor: Option<C>) -> Self {
        Self { limit, cursor }
    }
}

/// Cursor-aware page result.
#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("page size must be greater than zero")]
    InvalidPageSize,
}

/// Cut one page out of the items eligible for `feed`.
///
/// `items` may arrive in any order. Items at or below the cursor key are
/// considered; an item is never returned twice across a cursor chain, and
/// items newer than the cursor are never pulled into a later page.
pub fn paginate<T: Keyed>(
    feed: &FeedIdentity,
    mut items: Vec<T>,
    request: &PageRequest<FeedCursor>,
) -> Result<CursorPage<T>, PaginationError> {
    if request.limit == 0 {
        return Err(PaginationError::InvalidPageSize);
    }
    if let Some(cursor) = request.cursor.as_ref() {
        cursor.ensure_feed(feed)?;
        let ceiling = cursor.sort_key();
        items.retain(|item| item.sort_key() <= ceiling);
    }

    items.sort_by_key(|item| std::cmp::Reverse(item.sort_key()));

    let limit = request.limit as usize;
    items.truncate(limit + 1);

    let next_cursor = if items.len() > limit {
        items
            .pop()
            .map(|excluded| FeedCursor::at(*feed, &excluded).encode())
    } else {
        None
    };

    Ok(CursorPage::new(items, next_cursor))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use time::Duration;
    use time::macros::datetime;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Uuid,
        created_at: OffsetDateTime,
    }

    impl Keyed for Item {
        fn sort_key(&self) -> SortKey {
            SortKey::new(self.created_at, self.id)
        }
    }

    fn items(count: u128) -> Vec<Item> {
        let base = datetime!(2024-01-01 00:00 UTC);
        (0..count)
            .map(|n| Item {
                id: Uuid::from_u128(n + 1),
                created_at: base + Duration::minutes(n as i64),
            })
            .collect()
    }

    fn walk(feed: &FeedIdentity, source: &[Item], limit: u32) -> Vec<Vec<Item>> {
        let mut pages = Vec::new();
        let mut cursor = None;
        loop {
            let request = PageRequest::new(limit, cursor);
            let page = paginate(feed, source.to_vec(), &request).expect("page");
            pages.push(page.items);
            match page.next_cursor {
                Some(token) => {
                    cursor = Some(FeedCursor::decode_for(&token, feed).expect("cursor decodes"))
                }
                None => break,
            }
        }
        pages
    }

    #[test]
    fn cursor_round_trip() {
        let feed = FeedIdentity::liked_by(Uuid::new_v4());
        let when = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        let decoded = FeedCursor::decode(&FeedCursor::new(feed, when, id).encode())
            .expect("decoded cursor");

        assert_eq!(decoded.feed(), feed);
        assert_eq!(decoded.created_at(), when);
        assert_eq!(decoded.id(), id);
    }

    #[test]
    fn decoding_invalid_cursor_reports_error() {
        let err = FeedCursor::decode("not-base64!").expect_err("invalid cursor rejected");
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn cursor_from_another_feed_is_rejected() {
        let token = FeedCursor::new(FeedIdentity::global(), OffsetDateTime::now_utc(), Uuid::nil())
            .encode();
        let err = FeedCursor::decode_for(&token, &FeedIdentity::authored_by(Uuid::nil()))
            .expect_err("foreign cursor");
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn walking_cursors_returns_every_item_once_in_order() {
        let feed = FeedIdentity::global();
        let source = items(25);
        let pages = walk(&feed, &source, 10);

        assert_eq!(
            pages.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
        let flattened: Vec<Uuid> = pages.into_iter().flatten().map(|item| item.id).collect();
        let expected: Vec<Uuid> = (1..=25u128).rev().map(Uuid::from_u128).collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn exact_multiple_of_page_size_ends_without_cursor() {
        let feed = FeedIdentity::global();
        let page = paginate(&feed, items(10), &PageRequest::new(10, None)).expect("page");
        assert_eq!(page.items.len(), 10);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn next_cursor_names_the_first_excluded_item() {
        let feed = FeedIdentity::global();
        let page = paginate(&feed, items(5), &PageRequest::new(2, None)).expect("page");
        let cursor = FeedCursor::decode(page.next_cursor.as_deref().expect("more pages"))
            .expect("cursor decodes");
        assert_eq!(cursor.id(), Uuid::from_u128(3));
    }

    #[test]
    fn newer_items_never_leak_into_later_pages() {
        let feed = FeedIdentity::global();
        let mut source = items(6);
        let first = paginate(&feed, source.clone(), &PageRequest::new(3, None)).expect("page");
        let cursor = FeedCursor::decode(first.next_cursor.as_deref().expect("cursor"))
            .expect("cursor decodes");

        let fresh = Item {
            id: Uuid::from_u128(999),
            created_at: datetime!(2030-01-01 00:00 UTC),
        };
        source.push(fresh.clone());

        let second = paginate(&feed, source, &PageRequest::new(3, Some(cursor))).expect("page");
        assert!(!second.items.contains(&fresh));
        assert_eq!(second.items.len(), 3);
    }

    #[test]
    fn deleting_the_cursor_item_does_not_skip_its_successors() {
        let feed = FeedIdentity::global();
        let mut source = items(6);
        let first = paginate(&feed, source.clone(), &PageRequest::new(3, None)).expect("page");
        let cursor = FeedCursor::decode(first.next_cursor.as_deref().expect("cursor"))
            .expect("cursor decodes");
        source.retain(|item| item.id != cursor.id());

        let second = paginate(&feed, source, &PageRequest::new(3, Some(cursor))).expect("page");
        let ids: HashSet<Uuid> = second.items.iter().map(|item| item.id).collect();
        assert_eq!(
            ids,
            HashSet::from([Uuid::from_u128(1), Uuid::from_u128(2)])
        );
    }

    #[test]
    fn identical_timestamps_are_ordered_by_id_descending() {
        let feed = FeedIdentity::global();
        let when = datetime!(2024-01-01 00:00 UTC);
        let source: Vec<Item> = [3u128, 1, 2]
            .into_iter()
            .map(|n| Item {
                id: Uuid::from_u128(n),
                created_at: when,
            })
            .collect();

        let pages = walk(&feed, &source, 1);
        let ids: Vec<Uuid> = pages.into_iter().flatten().map(|item| item.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(3), Uuid::from_u128(2), Uuid::from_u128(1)]
        );
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = paginate(&FeedIdentity::global(), items(3), &PageRequest::new(0, None))
            .expect_err("zero limit");
        assert!(matches!(err, PaginationError::InvalidPageSize));
    }
}
