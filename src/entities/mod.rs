// Typed access to the backend tables. Repositories return `BackendError`; the service layer
// decides what the user sees.
use std::sync::Arc;

use crate::components::backend::Backend;

pub mod friend_requests;
pub mod friendships;
pub mod matchmaking;
pub mod messages;
pub mod tables;
pub mod users;

use friend_requests::FriendRequestsRepository;
use friendships::FriendshipsRepository;
use matchmaking::MatchmakingRepository;
use messages::MessagesRepository;
use users::UsersRepository;

#[derive(Clone)]
pub struct Repositories {
    pub friendships: FriendshipsRepository,
    pub friend_requests: FriendRequestsRepository,
    pub messages: MessagesRepository,
    pub users: UsersRepository,
    pub matchmaking: MatchmakingRepository,
}

impl Repositories {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            friendships: FriendshipsRepository::new(backend.clone()),
            friend_requests: FriendRequestsRepository::new(backend.clone()),
            messages: MessagesRepository::new(backend.clone()),
            users: UsersRepository::new(backend.clone()),
            matchmaking: MatchmakingRepository::new(backend),
        }
    }
}

/// Decodes a list of rows into `T`.
pub(crate) fn decode_rows<T: serde::de::DeserializeOwned>(
    rows: Vec<serde_json::Value>,
) -> Result<Vec<T>, crate::components::backend::BackendError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}
