use super::{friend_request::FriendRequest, friendship::Friendship};

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum FriendshipStatus {
    Friends,
    /// A pending request exists, sent by the contained user.
    Requested(String),
    NotFriends,
}

impl FriendshipStatus {
    /// Calculates the relation between two users from the caller's friendship row
    /// and the pending request between them, if any.
    pub fn from_records(
        friendship: Option<&Friendship>,
        pending_request: Option<&FriendRequest>,
    ) -> Self {
        if friendship.is_some() {
            return FriendshipStatus::Friends;
        }

        match pending_request {
            Some(request) => FriendshipStatus::Requested(request.from_user_id.clone()),
            None => FriendshipStatus::NotFriends,
        }
    }
}
