//! JSON handlers for the feed API.

mod feeds;
mod notifications;
mod posts;
mod users;

pub use feeds::{authored_feed, for_you_feed, liked_feed, user_liked_feed};
pub use notifications::{mark_notifications_read, unread_notifications};
pub use posts::{
    bookmark_info, create_post, delete_post, like_info, like_post, remove_bookmark, save_bookmark,
    unlike_post,
};
pub use users::{current_session, follow_user, follower_info, unfollow_user, update_profile};
