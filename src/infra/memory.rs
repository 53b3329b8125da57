//! In-memory repositories, used when no database is configured and in tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use feedline_api_types::{
    Attachment, Author, BookmarkInfo, FollowerInfo, LikeInfo, MediaKind, Post,
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::application::pagination::{CursorPage, FeedCursor, PageRequest, paginate};
use crate::application::repos::{
    CreatePostParams, FeedFilter, FeedRepo, MediaRepo, NotificationsRepo, PostsWriteRepo,
    ReactionsRepo, RepoError, SessionsRepo, UpdateProfileParams, UsersRepo,
};
use crate::application::session::{generate_token, hash_token};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{
    MediaRecord, NotificationKind, NotificationRecord, PostRecord, SessionRecord, UserRecord,
};

const SOURCE: &str = "infra::memory";
const SESSION_TTL: Duration = Duration::days(30);

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    posts: HashMap<Uuid, PostRecord>,
    media: HashMap<Uuid, MediaRecord>,
    likes: HashSet<(Uuid, Uuid)>,
    bookmarks: HashSet<(Uuid, Uuid)>,
    /// `(follower, followed)`
    follows: HashSet<(Uuid, Uuid)>,
    notifications: Vec<NotificationRecord>,
    sessions: HashMap<String, SessionRecord>,
}

impl State {
    fn author(&self, viewer: Uuid, user: &UserRecord) -> Author {
        Author {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            followers: self.followers(user.id),
            is_followed_by_user: self.follows.contains(&(viewer, user.id)),
        }
    }

    fn followers(&self, user_id: Uuid) -> u64 {
        self.follows
            .iter()
            .filter(|(_, followed)| *followed == user_id)
            .count() as u64
    }

    fn likes(&self, post_id: Uuid) -> u64 {
        self.likes
            .iter()
            .filter(|(_, liked)| *liked == post_id)
            .count() as u64
    }

    fn hydrate(&self, viewer: Uuid, record: &PostRecord) -> Result<Post, RepoError> {
        let author = self
            .users
            .get(&record.author_id)
            .ok_or_else(|| RepoError::from_persistence("post author is missing"))?;

        let mut media: Vec<&MediaRecord> = self
            .media
            .values()
            .filter(|item| item.post_id == Some(record.id))
            .collect();
        media.sort_by_key(|item| (item.created_at, item.id));

        Ok(Post {
            id: record.id,
            content: record.content.clone(),
            created_at: record.created_at,
            author: self.author(viewer, author),
            attachments: media
                .into_iter()
                .map(|item| Attachment {
                    id: item.id,
                    kind: item.kind,
                    url: item.url.clone(),
                })
                .collect(),
            likes: self.likes(record.id),
            is_liked_by_user: self.likes.contains(&(viewer, record.id)),
            is_bookmarked_by_user: self.bookmarks.contains(&(viewer, record.id)),
            comments: 0,
        })
    }

    fn matches(&self, filter: FeedFilter, record: &PostRecord) -> bool {
        match filter {
            FeedFilter::All => true,
            FeedFilter::LikedBy(user) => self.likes.contains(&(user, record.id)),
            FeedFilter::AuthoredBy(user) => record.author_id == user,
        }
    }
}

/// Process-local store implementing every repository trait.
#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    state: RwLock<State>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str, display_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        rw_write(&self.state, SOURCE, "add_user").users.insert(
            id,
            UserRecord {
                id,
                username: username.to_string(),
                display_name: display_name.to_string(),
                avatar_url: None,
                bio: None,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        id
    }

    pub fn add_post(&self, author_id: Uuid, content: &str) -> Uuid {
        self.add_post_at(author_id, content, OffsetDateTime::now_utc())
    }

    pub fn add_post_at(&self, author_id: Uuid, content: &str, created_at: OffsetDateTime) -> Uuid {
        let id = Uuid::new_v4();
        rw_write(&self.state, SOURCE, "add_post").posts.insert(
            id,
            PostRecord {
                id,
                author_id,
                content: content.to_string(),
                created_at,
            },
        );
        id
    }

    pub fn add_media(&self, owner_id: Uuid, kind: MediaKind, url: &str) -> Uuid {
        let id = Uuid::new_v4();
        rw_write(&self.state, SOURCE, "add_media").media.insert(
            id,
            MediaRecord {
                id,
                owner_id,
                post_id: None,
                kind,
                url: url.to_string(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        id
    }

    pub fn add_like(&self, user_id: Uuid, post_id: Uuid) {
        rw_write(&self.state, SOURCE, "add_like")
            .likes
            .insert((user_id, post_id));
    }

    pub fn add_follow(&self, follower_id: Uuid, followed_id: Uuid) {
        rw_write(&self.state, SOURCE, "add_follow")
            .follows
            .insert((follower_id, followed_id));
    }

    /// Remove a post behind every client's back, as another session would.
    pub fn remove_post(&self, post_id: Uuid) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "remove_post");
        state.likes.retain(|(_, liked)| *liked != post_id);
        state.bookmarks.retain(|(_, bookmarked)| *bookmarked != post_id);
        state.posts.remove(&post_id).is_some()
    }

    /// Open a session for `user_id` and return its bearer token.
    pub fn issue_session(&self, user_id: Uuid) -> Option<String> {
        let mut state = rw_write(&self.state, SOURCE, "issue_session");
        let username = state.users.get(&user_id)?.username.clone();
        let token = generate_token();
        let token_hash = hash_token(&token);
        state.sessions.insert(
            token_hash.clone(),
            SessionRecord {
                token_hash,
                user_id,
                username,
                expires_at: OffsetDateTime::now_utc() + SESSION_TTL,
            },
        );
        Some(token)
    }
}

#[async_trait]
impl FeedRepo for InMemoryRepositories {
    async fn list_feed(
        &self,
        viewer: Uuid,
        filter: FeedFilter,
        page: PageRequest<FeedCursor>,
    ) -> Result<CursorPage<Post>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "list_feed");
        let eligible: Vec<PostRecord> = state
            .posts
            .values()
            .filter(|record| state.matches(filter, record))
            .cloned()
            .collect();
        let page = paginate(&filter.identity(), eligible, &page)?;
        let posts = page
            .items
            .iter()
            .map(|record| state.hydrate(viewer, record))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CursorPage::new(posts, page.next_cursor))
    }

    async fn find_post(&self, viewer: Uuid, id: Uuid) -> Result<Option<Post>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_post");
        state
            .posts
            .get(&id)
            .map(|record| state.hydrate(viewer, record))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "create_post");
        if !state.users.contains_key(&params.author_id) {
            return Err(RepoError::invalid_input("author does not exist"));
        }
        for media_id in &params.media_ids {
            match state.media.get(media_id) {
                Some(item) if item.post_id.is_none() => {}
                _ => return Err(RepoError::invalid_input("media is not available")),
            }
        }

        let record = PostRecord {
            id: Uuid::new_v4(),
            author_id: params.author_id,
            content: params.content,
            created_at: OffsetDateTime::now_utc(),
        };
        for media_id in &params.media_ids {
            if let Some(item) = state.media.get_mut(media_id) {
                item.post_id = Some(record.id);
            }
        }
        state.posts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_post_record(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_post_record")
            .posts
            .get(&id)
            .cloned())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "delete_post");
        state.posts.remove(&id).ok_or(RepoError::NotFound)?;
        state.likes.retain(|(_, post)| *post != id);
        state.bookmarks.retain(|(_, post)| *post != id);
        state.media.retain(|_, item| item.post_id != Some(id));
        Ok(())
    }
}

#[async_trait]
impl ReactionsRepo for InMemoryRepositories {
    async fn set_like(&self, user_id: Uuid, post_id: Uuid, liked: bool) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "set_like");
        if liked {
            state.likes.insert((user_id, post_id));
        } else {
            state.likes.remove(&(user_id, post_id));
        }
        Ok(())
    }

    async fn set_bookmark(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        bookmarked: bool,
    ) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "set_bookmark");
        if bookmarked {
            state.bookmarks.insert((user_id, post_id));
        } else {
            state.bookmarks.remove(&(user_id, post_id));
        }
        Ok(())
    }

    async fn set_follow(
        &self,
        follower_id: Uuid,
        followed_id: Uuid,
        following: bool,
    ) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "set_follow");
        if following {
            if state.follows.insert((follower_id, followed_id)) {
                state.notifications.push(NotificationRecord {
                    id: Uuid::new_v4(),
                    recipient_id: followed_id,
                    issuer_id: follower_id,
                    kind: NotificationKind::Follow,
                    read: false,
                    created_at: OffsetDateTime::now_utc(),
                });
            }
        } else {
            state.follows.remove(&(follower_id, followed_id));
            state.notifications.retain(|item| {
                !(item.kind == NotificationKind::Follow
                    && item.issuer_id == follower_id
                    && item.recipient_id == followed_id)
            });
        }
        Ok(())
    }

    async fn like_info(&self, viewer: Uuid, post_id: Uuid) -> Result<LikeInfo, RepoError> {
        let state = rw_read(&self.state, SOURCE, "like_info");
        Ok(LikeInfo {
            likes: state.likes(post_id),
            is_liked_by_user: state.likes.contains(&(viewer, post_id)),
        })
    }

    async fn bookmark_info(&self, viewer: Uuid, post_id: Uuid) -> Result<BookmarkInfo, RepoError> {
        let state = rw_read(&self.state, SOURCE, "bookmark_info");
        Ok(BookmarkInfo {
            is_bookmarked_by_user: state.bookmarks.contains(&(viewer, post_id)),
        })
    }

    async fn follower_info(&self, viewer: Uuid, user_id: Uuid) -> Result<FollowerInfo, RepoError> {
        let state = rw_read(&self.state, SOURCE, "follower_info");
        Ok(FollowerInfo {
            followers: state.followers(user_id),
            is_followed_by_user: state.follows.contains(&(viewer, user_id)),
        })
    }
}

#[async_trait]
impl NotificationsRepo for InMemoryRepositories {
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "list_notifications");
        let mut items: Vec<NotificationRecord> = state
            .notifications
            .iter()
            .filter(|item| item.recipient_id == recipient_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(items)
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<u64, RepoError> {
        let state = rw_read(&self.state, SOURCE, "unread_count");
        Ok(state
            .notifications
            .iter()
            .filter(|item| item.recipient_id == recipient_id && !item.read)
            .count() as u64)
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "mark_all_read");
        let mut updated = 0;
        for item in state
            .notifications
            .iter_mut()
            .filter(|item| item.recipient_id == recipient_id && !item.read)
        {
            item.read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_user")
            .users
            .get(&id)
            .cloned())
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "update_profile");
        let user = state
            .users
            .get_mut(&params.user_id)
            .ok_or(RepoError::NotFound)?;
        user.display_name = params.display_name;
        user.bio = params.bio;
        if let Some(avatar_url) = params.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        Ok(user.clone())
    }
}

#[async_trait]
impl MediaRepo for InMemoryRepositories {
    async fn find_media(&self, ids: &[Uuid]) -> Result<Vec<MediaRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_media");
        Ok(ids
            .iter()
            .filter_map(|id| state.media.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl SessionsRepo for InMemoryRepositories {
    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_session")
            .sessions
            .get(token_hash)
            .cloned())
    }
}
