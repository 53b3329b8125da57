//! Bearer-token session lookup.

use std::sync::Arc;

use feedline_api_types::CurrentUser;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::error::FeedError;
use crate::application::repos::SessionsRepo;

const MIN_TOKEN_LEN: usize = 32;

/// Authenticated viewer attached to every feed read and social write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
}

impl From<SessionUser> for CurrentUser {
    fn from(user: SessionUser) -> Self {
        CurrentUser {
            id: user.id,
            username: user.username,
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    repo: Arc<dyn SessionsRepo>,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionsRepo>) -> Self {
        Self { repo }
    }

    pub async fn authenticate(&self, token: &str) -> Result<SessionUser, FeedError> {
        if token.len() < MIN_TOKEN_LEN {
            return Err(FeedError::Unauthorized);
        }
        let hashed = hash_token(token);
        let record = self
            .repo
            .find_session(&hashed)
            .await
            .map_err(|err| {
                debug!(error = %err, "session lookup failed");
                FeedError::Unauthorized
            })?
            .ok_or(FeedError::Unauthorized)?;

        if record.token_hash.as_bytes().ct_eq(hashed.as_bytes()).unwrap_u8() == 0 {
            return Err(FeedError::Unauthorized);
        }
        if record.expires_at <= OffsetDateTime::now_utc() {
            debug!(user_id = %record.user_id, "session expired");
            return Err(FeedError::Unauthorized);
        }

        Ok(SessionUser {
            id: record.user_id,
            username: record.username,
        })
    }

    /// Resolve an optional bearer token into the current user.
    pub async fn current_user(&self, token: Option<&str>) -> Result<CurrentUser, FeedError> {
        let token = token.ok_or(FeedError::Unauthorized)?;
        self.authenticate(token).await.map(CurrentUser::from)
    }
}

/// Hex encoded SHA-256 of a session token, the form sessions are stored under.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize().to_vec())
}

/// Fresh random session token.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
