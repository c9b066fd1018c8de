use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CommonError;

#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum RequestStatus {
    #[serde(rename = "pending")]
    Pending, // Waiting for the receiver to answer
    #[serde(rename = "accepted")]
    Accepted, // The receiver accepted, both friendship rows should exist
    #[serde(rename = "rejected")]
    Rejected, // The receiver declined
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match *self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

lazy_static::lazy_static! {
    static ref VALID_REQUEST_STATUS_TRANSITIONS: HashMap<RequestStatus, Vec<Option<RequestStatus>>> = {
        let mut m = HashMap::new();

        // Each entry lists the statuses a request may hold right before moving into the key.
        // `None` stands for a request that doesn't exist yet.
        m.insert(RequestStatus::Pending, vec![None]);
        m.insert(RequestStatus::Accepted, vec![Some(RequestStatus::Pending)]);
        m.insert(RequestStatus::Rejected, vec![Some(RequestStatus::Pending)]);

        m
    };
}

impl RequestStatus {
    /// Validate the new status is reachable from the current one and different from it.
    pub fn validate_transition_is_valid(
        current_status: &Option<RequestStatus>,
        new_status: RequestStatus,
    ) -> bool {
        if current_status.map_or(true, |status| status != new_status) {
            VALID_REQUEST_STATUS_TRANSITIONS
                .get(&new_status)
                .map_or(false, |valid| valid.contains(current_status))
        } else {
            false
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FriendRequest {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

impl FriendRequest {
    /// The identity on the other side of the request, seen from `user_id`.
    pub fn counterpart<'a>(&'a self, user_id: &str) -> &'a str {
        if self.from_user_id == user_id {
            &self.to_user_id
        } else {
            &self.from_user_id
        }
    }

    pub fn is_incoming_for(&self, user_id: &str) -> bool {
        self.to_user_id == user_id
    }
}

/// Validates that `acting_user` may move `request` into `new_status`.
/// Only the receiver answers a request, and only once.
pub fn validate_response(
    acting_user: &str,
    request: &FriendRequest,
    new_status: RequestStatus,
) -> Result<(), CommonError> {
    if !request.is_incoming_for(acting_user) {
        log::error!(
            "Validate response > User {} tried to answer request {} addressed to {}",
            acting_user,
            request.id,
            request.to_user_id
        );
        return Err(CommonError::Forbidden(
            "Only the receiver can answer a friend request".to_owned(),
        ));
    }

    let is_valid =
        RequestStatus::validate_transition_is_valid(&Some(request.status), new_status);
    if !is_valid {
        log::error!(
            "Validate response > Invalid status transition for request {}: {:?} -> {:?}",
            request.id,
            request.status,
            new_status
        );
        return Err(CommonError::BadRequest(
            "This friend request was already answered".to_owned(),
        ));
    }

    Ok(())
}
