// Contains files that define objects representing business logic concepts used across the crate.
pub mod conversation;
pub mod error;
pub mod friend_request;
pub mod friendship;
pub mod friendship_status;
pub mod matching;
pub mod message;
pub mod user;
