use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One direction of a friendship: `user_id` lists `friend_id` among its friends.
/// Each side owns its own row, so a mutual friendship is two rows.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Friendship {
    pub id: String,
    pub user_id: String,
    pub friend_id: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Friendship {
    /// Nickname given by the owner, if any non blank one was set.
    pub fn nickname(&self) -> Option<&str> {
        self.nickname
            .as_deref()
            .map(str::trim)
            .filter(|nickname| !nickname.is_empty())
    }
}
