//! Item level edits the reconciler applies to cached feeds.

use feedline_api_types::Post;
use uuid::Uuid;

use crate::cache::FeedStore;
use crate::domain::types::FeedIdentity;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEdit {
    /// Prepend `post` to the first page of each target.
    InsertAtTop {
        targets: Vec<FeedIdentity>,
        post: Post,
    },
    Remove {
        post_id: Uuid,
    },
    /// Put `post` back at its sorted position.
    Reinsert {
        post: Post,
    },
    /// Swap every cached copy of `post_id` for `post`.
    Replace {
        post_id: Uuid,
        post: Post,
    },
    SetLike {
        post_id: Uuid,
        liked: bool,
    },
    SetBookmark {
        post_id: Uuid,
        bookmarked: bool,
    },
    SetFollow {
        user_id: Uuid,
        following: bool,
    },
    PatchAuthor {
        user_id: Uuid,
        display_name: String,
        avatar_url: Option<String>,
    },
}

impl FeedEdit {
    /// Apply the edit to the cached entries in `scope`.
    ///
    /// Returns the identities whose entries changed, in lock order.
    pub fn apply(&self, store: &FeedStore, scope: &[FeedIdentity]) -> Vec<FeedIdentity> {
        let in_scope = |identity: &FeedIdentity| scope.contains(identity);
        match self {
            FeedEdit::InsertAtTop { targets, post } => {
                let mut touched: Vec<FeedIdentity> = targets
                    .iter()
                    .filter(|identity| in_scope(*identity))
                    .filter(|identity| store.insert_at_top(*identity, post.clone()))
                    .copied()
                    .collect();
                touched.sort();
                touched
            }
            FeedEdit::Remove { post_id } => store.remove_item(in_scope, *post_id),
            FeedEdit::Reinsert { post } => {
                let mut touched: Vec<FeedIdentity> = scope
                    .iter()
                    .filter(|identity| store.reinsert(*identity, post.clone()))
                    .copied()
                    .collect();
                touched.sort();
                touched
            }
            FeedEdit::Replace { post_id, post } => store.map_all(in_scope, |cached| {
                if cached.id != *post_id {
                    return false;
                }
                *cached = post.clone();
                true
            }),
            FeedEdit::SetLike { post_id, liked } => store.map_all(in_scope, |cached| {
                if cached.id != *post_id || cached.is_liked_by_user == *liked {
                    return false;
                }
                cached.is_liked_by_user = *liked;
                cached.likes = adjust(cached.likes, *liked);
                true
            }),
            FeedEdit::SetBookmark {
                post_id,
                bookmarked,
            } => store.map_all(in_scope, |cached| {
                if cached.id != *post_id || cached.is_bookmarked_by_user == *bookmarked {
                    return false;
                }
                cached.is_bookmarked_by_user = *bookmarked;
                true
            }),
            FeedEdit::SetFollow { user_id, following } => store.map_all(in_scope, |cached| {
                let author = &mut cached.author;
                if author.id != *user_id || author.is_followed_by_user == *following {
                    return false;
                }
                author.is_followed_by_user = *following;
                author.followers = adjust(author.followers, *following);
                true
            }),
            FeedEdit::PatchAuthor {
                user_id,
                display_name,
                avatar_url,
            } => store.map_all(in_scope, |cached| {
                let author = &mut cached.author;
                if author.id != *user_id
                    || (author.display_name == *display_name && author.avatar_url == *avatar_url)
                {
                    return false;
                }
                author.display_name = display_name.clone();
                author.avatar_url = avatar_url.clone();
                true
            }),
        }
    }
}

/// `+1` when a flag turns on, `-1` when it turns off.
fn adjust(count: u64, enabled: bool) -> u64 {
    if enabled {
        count.saturating_add(1)
    } else {
        count.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use feedline_api_types::{Author, PostsPage};
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::CacheConfig;

    fn post(id: u128, author: u128) -> Post {
        Post {
            id: Uuid::from_u128(id),
            content: "hello".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            author: Author {
                id: Uuid::from_u128(author),
                username: "ada".to_string(),
                display_name: "Ada".to_string(),
                avatar_url: None,
                followers: 4,
                is_followed_by_user: false,
            },
            attachments: Vec::new(),
            likes: 10,
            is_liked_by_user: false,
            is_bookmarked_by_user: false,
            comments: 0,
        }
    }

    fn seeded() -> (FeedStore, Vec<FeedIdentity>) {
        let store = FeedStore::new(&CacheConfig::default());
        let global = FeedIdentity::global();
        let liked = FeedIdentity::liked_by(Uuid::from_u128(99));
        store
            .put(
                global,
                PostsPage::new(vec![post(1, 7), post(2, 8)], None),
                None,
                true,
            )
            .expect("global");
        store
            .put(liked, PostsPage::new(vec![post(1, 7)], None), None, true)
            .expect("liked");
        (store, vec![global, liked])
    }

    fn cached(store: &FeedStore, identity: &FeedIdentity, id: u128) -> Post {
        store
            .get(identity)
            .and_then(|entry| entry.find(Uuid::from_u128(id)).cloned())
            .expect("cached post")
    }

    #[test]
    fn set_like_adjusts_every_copy_once() {
        let (store, scope) = seeded();
        let edit = FeedEdit::SetLike {
            post_id: Uuid::from_u128(1),
            liked: true,
        };
        assert_eq!(edit.apply(&store, &scope), scope);
        assert!(edit.apply(&store, &scope).is_empty());

        for identity in &scope {
            let post = cached(&store, identity, 1);
            assert_eq!((post.likes, post.is_liked_by_user), (11, true));
        }
    }

    #[test]
    fn follow_and_profile_patches_target_the_author() {
        let (store, scope) = seeded();
        FeedEdit::SetFollow {
            user_id: Uuid::from_u128(7),
            following: true,
        }
        .apply(&store, &scope);
        FeedEdit::PatchAuthor {
            user_id: Uuid::from_u128(8),
            display_name: "Bea".to_string(),
            avatar_url: Some("https://cdn.test/bea.png".to_string()),
        }
        .apply(&store, &scope);

        let followed = cached(&store, &scope[1], 1);
        assert!(followed.author.is_followed_by_user);
        assert_eq!(followed.author.followers, 5);
        let patched = cached(&store, &scope[0], 2);
        assert_eq!(patched.author.display_name, "Bea");
        assert!(!patched.author.is_followed_by_user);
    }

    #[test]
    fn edits_outside_scope_are_ignored() {
        let (store, scope) = seeded();
        let touched = FeedEdit::Remove {
            post_id: Uuid::from_u128(1),
        }
        .apply(&store, &scope[..1]);
        assert_eq!(touched, vec![scope[0]]);
        assert!(store.get(&scope[1]).expect("liked").contains(Uuid::from_u128(1)));
    }

    #[test]
    fn replace_swaps_provisional_copies() {
        let (store, scope) = seeded();
        let mut server = post(42, 7);
        server.content = "from server".to_string();
        let touched = FeedEdit::Replace {
            post_id: Uuid::from_u128(1),
            post: server,
        }
        .apply(&store, &scope);
        assert_eq!(touched, scope);
        assert_eq!(cached(&store, &scope[0], 42).content, "from server");
    }
}
