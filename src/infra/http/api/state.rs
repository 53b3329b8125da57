use std::sync::Arc;

use crate::application::feed::FeedService;
use crate::application::notifications::NotificationService;
use crate::application::session::SessionService;
use crate::application::social::SocialService;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionService>,
    pub feed: Arc<FeedService>,
    pub social: Arc<SocialService>,
    pub notifications: Arc<NotificationService>,
}
