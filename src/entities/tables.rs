// Table and column names shared by the repositories and the change subscriptions.
pub const FRIENDS_TABLE: &str = "friends";
pub const FRIEND_REQUESTS_TABLE: &str = "friend_requests";
pub const MESSAGES_TABLE: &str = "messages";
pub const USERS_TABLE: &str = "users";

pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";

pub const USER_ID: &str = "user_id";
pub const FRIEND_ID: &str = "friend_id";
pub const NICKNAME: &str = "nickname";

pub const FROM_USER_ID: &str = "from_user_id";
pub const TO_USER_ID: &str = "to_user_id";
pub const STATUS: &str = "status";
pub const RESPONDED_AT: &str = "responded_at";

pub const SENDER_ID: &str = "sender_id";
pub const RECIPIENT_ID: &str = "recipient_id";
pub const LISTENED_AT: &str = "listened_at";
pub const PLAY_COUNT: &str = "play_count";

pub const USERNAME: &str = "username";

pub const MATCHED_USER_ID: &str = "matched_user_id";
