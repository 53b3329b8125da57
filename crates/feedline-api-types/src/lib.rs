//! Wire types shared by the Feedline server and its clients.
//!
//! Field names are camelCase on the wire. Timestamps are RFC 3339 strings.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Author summary embedded in every post, computed for the requesting viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub followers: u64,
    pub is_followed_by_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub kind: MediaKind,
    pub url: String,
}

/// A feed item as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: Author,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub likes: u64,
    pub is_liked_by_user: bool,
    pub is_bookmarked_by_user: bool,
    #[serde(default)]
    pub comments: u64,
}

impl Post {
    /// Like counters in the shape returned by the likes endpoint.
    pub fn like_info(&self) -> LikeInfo {
        LikeInfo {
            likes: self.likes,
            is_liked_by_user: self.is_liked_by_user,
        }
    }
}

/// One page of a cursor-paginated feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
    /// Set when the server discarded an unusable cursor and served the first page.
    #[serde(default, skip_serializing_if = "is_false")]
    pub restarted: bool,
}

impl PostsPage {
    pub fn new(posts: Vec<Post>, next_cursor: Option<String>) -> Self {
        Self {
            posts,
            next_cursor,
            restarted: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeInfo {
    pub likes: u64,
    pub is_liked_by_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkInfo {
    pub is_bookmarked_by_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerInfo {
    pub followers: u64,
    pub is_followed_by_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadNotifications {
    pub unread_count: u64,
}

/// Result of marking the inbox as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsMarked {
    pub updated: u64,
}

/// The authenticated principal behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub media_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    /// Media id of an uploaded avatar; the server resolves it to a URL.
    #[serde(default)]
    pub avatar_media_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_post() -> Post {
        Post {
            id: Uuid::nil(),
            content: "hello".to_string(),
            created_at: datetime!(2024-05-01 12:00 UTC),
            author: Author {
                id: Uuid::nil(),
                username: "ada".to_string(),
                display_name: "Ada".to_string(),
                avatar_url: None,
                followers: 3,
                is_followed_by_user: false,
            },
            attachments: Vec::new(),
            likes: 10,
            is_liked_by_user: false,
            is_bookmarked_by_user: true,
            comments: 0,
        }
    }

    #[test]
    fn posts_page_uses_camel_case_and_hides_restart_flag() {
        let page = PostsPage::new(vec![sample_post()], Some("abc".to_string()));
        let value = serde_json::to_value(&page).expect("page serializes");

        assert_eq!(value["nextCursor"], "abc");
        assert!(value.get("restarted").is_none());
        assert_eq!(value["posts"][0]["isLikedByUser"], false);
        assert_eq!(value["posts"][0]["createdAt"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn posts_page_defaults_missing_restart_flag() {
        let raw = r#"{"posts":[],"nextCursor":null}"#;
        let page: PostsPage = serde_json::from_str(raw).expect("page parses");
        assert!(!page.restarted);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn like_info_reflects_post_counters() {
        let info = sample_post().like_info();
        assert_eq!(
            info,
            LikeInfo {
                likes: 10,
                is_liked_by_user: false
            }
        );
    }
}
