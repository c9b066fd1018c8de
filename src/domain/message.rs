use chrono::{DateTime, Duration, Utc};

use super::error::CommonError;

pub const EXPIRY_TIME: &str = "time";
pub const EXPIRY_PLAYBACK: &str = "playback";
pub const EXPIRY_VIEW: &str = "view";

/// When a message stops being accessible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryRule {
    /// Gone `seconds` after it was sent.
    Time { seconds: i64 },
    /// Gone after being played `count` times.
    Playback { count: i32 },
    /// Gone once it was listened to.
    View,
}

impl ExpiryRule {
    /// Builds the rule from its stored `(expiry_type, expiry_value)` columns.
    pub fn from_columns(expiry_type: &str, expiry_value: Option<i64>) -> Result<Self, CommonError> {
        match (expiry_type, expiry_value) {
            (EXPIRY_TIME, Some(seconds)) => Ok(ExpiryRule::Time { seconds }),
            (EXPIRY_PLAYBACK, Some(count)) => i32::try_from(count)
                .map(|count| ExpiryRule::Playback { count })
                .map_err(|_| CommonError::BadRequest(format!("Invalid playback count {count}"))),
            (EXPIRY_VIEW, _) => Ok(ExpiryRule::View),
            (other, value) => Err(CommonError::BadRequest(format!(
                "Unknown expiry rule {other} with value {value:?}"
            ))),
        }
    }

    pub fn to_columns(&self) -> (&'static str, Option<i64>) {
        match *self {
            ExpiryRule::Time { seconds } => (EXPIRY_TIME, Some(seconds)),
            ExpiryRule::Playback { count } => (EXPIRY_PLAYBACK, Some(i64::from(count))),
            ExpiryRule::View => (EXPIRY_VIEW, None),
        }
    }

    pub fn validate(&self) -> Result<(), CommonError> {
        match *self {
            ExpiryRule::Time { seconds } if seconds <= 0 => Err(CommonError::BadRequest(
                "Expiry time must be positive".to_owned(),
            )),
            ExpiryRule::Playback { count } if count <= 0 => Err(CommonError::BadRequest(
                "Playback count must be positive".to_owned(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub listened_at: Option<DateTime<Utc>>,
    pub play_count: i32,
    pub expiry: ExpiryRule,
}

impl Message {
    /// The identity on the other side of the message, seen from `user_id`.
    pub fn counterpart<'a>(&'a self, user_id: &str) -> &'a str {
        if self.sender_id == user_id {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    pub fn is_listened(&self) -> bool {
        self.listened_at.is_some()
    }

    /// `None` when the deadline is past what a timestamp can hold, so it never comes.
    fn expires_at(&self, seconds: i64) -> Option<DateTime<Utc>> {
        Duration::try_seconds(seconds).and_then(|ttl| self.created_at.checked_add_signed(ttl))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            ExpiryRule::Time { seconds } => self.expires_at(seconds).map_or(false, |at| at <= now),
            ExpiryRule::Playback { count } => self.play_count >= count,
            ExpiryRule::View => self.is_listened(),
        }
    }
}
