//! Feed identities shared by the server resolver, cursors and the client cache.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Which eligibility predicate a feed applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Global,
    LikedBy,
    AuthoredBy,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::LikedBy => "liked-by",
            Self::AuthoredBy => "authored-by",
        }
    }

    pub fn requires_scope(self) -> bool {
        !matches!(self, Self::Global)
    }
}

/// Identity of one paginated view: `(kind, scope)`.
///
/// Ordering is by kind and then scope. Lock acquisition across several
/// identities always follows this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedIdentity {
    kind: FeedKind,
    scope: Option<Uuid>,
}

impl FeedIdentity {
    pub fn new(kind: FeedKind, scope: Option<Uuid>) -> Result<Self, DomainError> {
        match (kind.requires_scope(), scope) {
            (true, None) => Err(DomainError::MissingScope { kind }),
            (false, Some(_)) => Err(DomainError::UnexpectedScope { kind }),
            _ => Ok(Self { kind, scope }),
        }
    }

    pub fn global() -> Self {
        Self {
            kind: FeedKind::Global,
            scope: None,
        }
    }

    pub fn liked_by(user_id: Uuid) -> Self {
        Self {
            kind: FeedKind::LikedBy,
            scope: Some(user_id),
        }
    }

    pub fn authored_by(user_id: Uuid) -> Self {
        Self {
            kind: FeedKind::AuthoredBy,
            scope: Some(user_id),
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn scope(&self) -> Option<Uuid> {
        self.scope
    }
}

impl Display for FeedIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}:{scope}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl FromStr for FeedIdentity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, scope) = match s.split_once(':') {
            Some((kind, scope)) => (kind, Some(scope)),
            None => (s, None),
        };
        let kind = match kind {
            "global" => FeedKind::Global,
            "liked-by" => FeedKind::LikedBy,
            "authored-by" => FeedKind::AuthoredBy,
            other => {
                return Err(DomainError::malformed_identity(format!(
                    "unknown feed kind `{other}`"
                )));
            }
        };
        let scope = scope
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|err| DomainError::malformed_identity(format!("invalid feed scope: {err}")))?;
        Self::new(kind, scope)
    }
}
