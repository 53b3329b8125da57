use feedline_api_types::MediaKind;

use crate::application::repos::RepoError;
use crate::domain::entities::NotificationKind;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("violates")
                || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

pub(crate) fn convert_count(value: i64) -> Result<u64, RepoError> {
    value
        .try_into()
        .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
}

pub(crate) fn parse_media_kind(value: &str) -> Result<MediaKind, RepoError> {
    match value {
        "image" => Ok(MediaKind::Image),
        "video" => Ok(MediaKind::Video),
        other => Err(RepoError::from_persistence(format!(
            "unknown media kind `{other}`"
        ))),
    }
}

pub(crate) fn parse_notification_kind(value: &str) -> Result<NotificationKind, RepoError> {
    match value {
        "FOLLOW" => Ok(NotificationKind::Follow),
        other => Err(RepoError::from_persistence(format!(
            "unknown notification kind `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_kinds_convert() {
        assert_eq!(convert_count(3).expect("count"), 3);
        assert!(convert_count(-1).is_err());
        assert_eq!(parse_media_kind("video").expect("kind"), MediaKind::Video);
        assert!(parse_media_kind("audio").is_err());
        assert_eq!(
            parse_notification_kind("FOLLOW").expect("kind"),
            NotificationKind::Follow
        );
        assert!(parse_notification_kind("follow").is_err());
    }

    #[test]
    fn missing_rows_are_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }
}
