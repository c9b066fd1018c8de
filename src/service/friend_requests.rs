use chrono::Utc;

use super::{backend_error, SocialContext};
use crate::{
    components::{
        backend::BackendError,
        notifier::Notice,
        realtime::{ChangeFilter, ChangeKind, TableChange},
    },
    domain::{
        error::CommonError,
        friend_request::{validate_response, FriendRequest, RequestStatus},
        friendship::Friendship,
        friendship_status::FriendshipStatus,
        user::validate_username,
    },
    entities::{
        tables::{FRIENDS_TABLE, FRIEND_REQUESTS_TABLE, FROM_USER_ID, STATUS, TO_USER_ID, USER_ID},
        Repositories,
    },
};

/// What the friends list screen shows. Always rebuilt from scratch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FriendsListState {
    pub incoming: Vec<FriendRequest>,
    pub outgoing: Vec<FriendRequest>,
    pub friends: Vec<Friendship>,
}

/// The three feeds the friends list listens to: requests sent to the caller, updates on the
/// caller's own requests and the caller's friendship rows.
pub fn lifecycle_filters(user_id: &str) -> Vec<ChangeFilter> {
    vec![
        ChangeFilter::new(FRIEND_REQUESTS_TABLE, TO_USER_ID, user_id).on(ChangeKind::Insert),
        ChangeFilter::new(FRIEND_REQUESTS_TABLE, FROM_USER_ID, user_id).on(ChangeKind::Update),
        ChangeFilter::new(FRIENDS_TABLE, USER_ID, user_id),
    ]
}

/// When `change` is one of the caller's requests turning accepted, returns who accepted it.
pub fn accepted_by(user_id: &str, change: &TableChange) -> Option<String> {
    if change.table != FRIEND_REQUESTS_TABLE || change.kind != ChangeKind::Update {
        return None;
    }
    if change.field(FROM_USER_ID) != Some(user_id)
        || change.field(STATUS) != Some(RequestStatus::Accepted.as_str())
    {
        return None;
    }

    // Without a full replica identity the old record only carries the key
    let was_accepted = change
        .old_record
        .get(STATUS)
        .and_then(serde_json::Value::as_str)
        == Some(RequestStatus::Accepted.as_str());
    if was_accepted {
        return None;
    }

    change.field(TO_USER_ID).map(str::to_string)
}

#[tracing::instrument(name = "Load friends list", skip(ctx))]
pub async fn load_friends_list(ctx: &SocialContext) -> Result<FriendsListState, CommonError> {
    let me = ctx.me();
    let (incoming, outgoing, friends) = tokio::try_join!(
        ctx.repos.friend_requests.get_pending_incoming(me),
        ctx.repos.friend_requests.get_pending_outgoing(me),
        ctx.repos.friendships.get_user_friends(me),
    )
    .map_err(|err| backend_error("Load friends list", err))?;

    Ok(FriendsListState {
        incoming,
        outgoing,
        friends,
    })
}

async fn get_request(ctx: &SocialContext, request_id: &str) -> Result<FriendRequest, CommonError> {
    ctx.repos
        .friend_requests
        .get(request_id)
        .await
        .map_err(|err| backend_error("Get friend request", err))?
        .ok_or_else(|| CommonError::NotFound(format!("Friend request {request_id} not found")))
}

async fn answer_request(
    ctx: &SocialContext,
    request_id: &str,
    new_status: RequestStatus,
) -> Result<FriendRequest, CommonError> {
    let request = get_request(ctx, request_id).await?;
    validate_response(ctx.me(), &request, new_status)?;

    ctx.repos
        .friend_requests
        .update_status(
            request_id,
            RequestStatus::Pending,
            new_status,
            Some(Utc::now()),
        )
        .await
        .map_err(|err| backend_error("Answer friend request", err))?
        // Someone else moved it out of pending between the read and the update
        .ok_or_else(|| {
            CommonError::BadRequest("This friend request was already answered".to_owned())
        })
}

/// Inserts `user_id -> friend_id`. `Ok(false)` means the row was already there.
async fn insert_friendship(
    repos: &Repositories,
    user_id: &str,
    friend_id: &str,
) -> Result<bool, BackendError> {
    match repos.friendships.create_friendship(user_id, friend_id).await {
        Ok(_) => Ok(true),
        Err(BackendError::Duplicate(_)) => {
            log::debug!("Create friendship > {user_id} -> {friend_id} already exists");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Creates both directions of a friendship. When the second insert fails the first one is
/// deleted again, if this call created it. A failed cleanup is reported as
/// `CommonError::PartiallyApplied`.
pub(crate) async fn create_friendship_pair(
    repos: &Repositories,
    user_id: &str,
    friend_id: &str,
) -> Result<(), CommonError> {
    let created_first = insert_friendship(repos, user_id, friend_id)
        .await
        .map_err(|err| backend_error("Create friendship pair", err))?;

    let err = match insert_friendship(repos, friend_id, user_id).await {
        Ok(_) => return Ok(()),
        Err(err) => backend_error("Create friendship pair", err),
    };

    if created_first {
        if let Err(cleanup) = repos.friendships.delete_friendship(user_id, friend_id).await {
            log::error!(
                "Create friendship pair > Couldn't delete {user_id} -> {friend_id} after a failed insert: {cleanup}"
            );
            return Err(CommonError::PartiallyApplied(format!(
                "Only {user_id} -> {friend_id} was stored"
            )));
        }
    }

    Err(err)
}

/// Accepts a pending request addressed to the caller and makes both users friends.
///
/// The request is marked accepted first. If the friendship rows can't be stored the request
/// goes back to pending, so the user can retry.
#[tracing::instrument(name = "Accept friend request", skip(ctx))]
pub async fn accept_request(
    ctx: &SocialContext,
    request_id: &str,
) -> Result<FriendRequest, CommonError> {
    let request = answer_request(ctx, request_id, RequestStatus::Accepted).await?;

    if let Err(err) =
        create_friendship_pair(&ctx.repos, &request.to_user_id, &request.from_user_id).await
    {
        let reverted = ctx
            .repos
            .friend_requests
            .update_status(request_id, RequestStatus::Accepted, RequestStatus::Pending, None)
            .await;

        return match (reverted, err) {
            (Ok(Some(_)), err @ CommonError::PartiallyApplied(_)) => Err(err),
            (Ok(Some(_)), _) => Err(CommonError::Unknown(
                "Couldn't accept the friend request, please try again".to_owned(),
            )),
            (Ok(None), _) => {
                log::error!("Accept friend request > Request {request_id} is no longer accepted, can't revert it");
                Err(CommonError::PartiallyApplied(format!(
                    "Request {request_id} was accepted without friendship rows"
                )))
            }
            (Err(revert), _) => {
                log::error!("Accept friend request > Couldn't revert request {request_id}: {revert}");
                Err(CommonError::PartiallyApplied(format!(
                    "Request {request_id} was accepted without friendship rows"
                )))
            }
        };
    }

    let name = ctx.display_name(&request.from_user_id).await;
    ctx.notifier.notify(Notice::FriendAdded { name });

    Ok(request)
}

/// Declines a pending request. Only the status changes.
#[tracing::instrument(name = "Reject friend request", skip(ctx))]
pub async fn reject_request(
    ctx: &SocialContext,
    request_id: &str,
) -> Result<FriendRequest, CommonError> {
    answer_request(ctx, request_id, RequestStatus::Rejected).await
}

#[tracing::instrument(name = "Send friend request", skip(ctx))]
pub async fn send_request(ctx: &SocialContext, username: &str) -> Result<FriendRequest, CommonError> {
    validate_username(username)?;
    let me = ctx.me();

    let user = ctx
        .repos
        .users
        .get_by_username(username)
        .await
        .map_err(|err| backend_error("Send friend request", err))?
        .ok_or_else(|| CommonError::UserNotFound(format!("No user named {username}")))?;

    if user.id == me {
        return Err(CommonError::BadRequest(
            "You can't send a friend request to yourself".to_owned(),
        ));
    }

    let (friendship, sent, received) = tokio::try_join!(
        ctx.repos.friendships.get_friendship(me, &user.id),
        ctx.repos.friend_requests.get_pending_from(me, &user.id),
        ctx.repos.friend_requests.get_pending_from(&user.id, me),
    )
    .map_err(|err| backend_error("Send friend request", err))?;

    match FriendshipStatus::from_records(friendship.as_ref(), sent.as_ref().or(received.as_ref())) {
        FriendshipStatus::Friends => {
            return Err(CommonError::BadRequest(format!(
                "You are already friends with {username}"
            )))
        }
        FriendshipStatus::Requested(_) => {
            return Err(CommonError::BadRequest(format!(
                "There is already a pending request with {username}"
            )))
        }
        FriendshipStatus::NotFriends => {}
    }

    ctx.repos
        .friend_requests
        .create(me, &user.id)
        .await
        .map_err(|err| match err {
            BackendError::Duplicate(_) => CommonError::BadRequest(format!(
                "There is already a pending request with {username}"
            )),
            err => backend_error("Send friend request", err),
        })
}

/// Removes `friend_id` from the caller's list. The friend's own row is left alone.
#[tracing::instrument(name = "Remove friend", skip(ctx))]
pub async fn remove_friend(ctx: &SocialContext, friend_id: &str) -> Result<(), CommonError> {
    ctx.repos
        .friendships
        .delete_friendship(ctx.me(), friend_id)
        .await
        .map_err(|err| backend_error("Remove friend", err))
}

/// Renames a friend in the caller's list. A blank nickname clears it.
#[tracing::instrument(name = "Set nickname", skip(ctx))]
pub async fn set_nickname(
    ctx: &SocialContext,
    friend_id: &str,
    nickname: Option<&str>,
) -> Result<Friendship, CommonError> {
    let nickname = nickname.map(str::trim).filter(|name| !name.is_empty());

    ctx.repos
        .friendships
        .update_nickname(ctx.me(), friend_id, nickname)
        .await
        .map_err(|err| backend_error("Set nickname", err))?
        .ok_or_else(|| CommonError::NotFound(format!("{friend_id} is not in your friends list")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{accepted_by, create_friendship_pair, lifecycle_filters};
    use crate::{
        components::{
            backend::BackendError,
            notifier::MockNotifier,
            realtime::{ChangeKind, TableChange},
        },
        domain::error::CommonError,
        service::tests::{context, stored, MockDb},
    };

    fn failing_for(user_id: &'static str) -> impl Fn(&str, serde_json::Value) -> Result<serde_json::Value, BackendError> {
        move |_, fields| {
            if fields["user_id"] == user_id {
                Err(BackendError::Http {
                    status: 500,
                    message: "boom".to_string(),
                })
            } else {
                stored(fields)
            }
        }
    }

    #[tokio::test]
    async fn second_insert_failure_deletes_the_first_row() {
        let mut db = MockDb::new();
        db.expect_insert_row()
            .times(2)
            .returning(failing_for("alice"));
        db.expect_delete_rows()
            .withf(|table, filters| {
                table.to_string() == "friends"
                    && filters.len() == 2
                    && filters[0].value == json!("me")
                    && filters[1].value == json!("alice")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let ctx = context(db, MockNotifier::new());

        let result = create_friendship_pair(&ctx.repos, "me", "alice").await;

        assert_eq!(result, Err(CommonError::Unknown("".to_string())));
    }

    #[tokio::test]
    async fn existing_first_row_is_left_alone() {
        let mut db = MockDb::new();
        db.expect_insert_row()
            .withf(|table, fields| table.to_string() == "friends" && fields["user_id"] == "me")
            .times(1)
            .returning(|_, _| Err(BackendError::Duplicate("exists".to_string())));
        db.expect_insert_row()
            .withf(|table, fields| table.to_string() == "friends" && fields["user_id"] == "alice")
            .times(1)
            .returning(failing_for("alice"));
        db.expect_delete_rows().times(0);
        let ctx = context(db, MockNotifier::new());

        let result = create_friendship_pair(&ctx.repos, "me", "alice").await;

        assert_eq!(result, Err(CommonError::Unknown("".to_string())));
    }

    #[tokio::test]
    async fn failed_cleanup_is_partially_applied() {
        let mut db = MockDb::new();
        db.expect_insert_row()
            .times(2)
            .returning(failing_for("alice"));
        db.expect_delete_rows().times(1).returning(|_, _| {
            Err(BackendError::Http {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let ctx = context(db, MockNotifier::new());

        let result = create_friendship_pair(&ctx.repos, "me", "alice").await;

        assert_eq!(result, Err(CommonError::PartiallyApplied("".to_string())));
    }

    fn request_update(status: &str, old_status: Option<&str>) -> TableChange {
        TableChange {
            table: "friend_requests".to_string(),
            kind: ChangeKind::Update,
            record: json!({
                "id": "req-1",
                "from_user_id": "me",
                "to_user_id": "alice",
                "status": status,
            }),
            old_record: match old_status {
                Some(old) => json!({ "id": "req-1", "status": old }),
                None => json!({ "id": "req-1" }),
            },
        }
    }

    #[test]
    fn accepted_outgoing_request_names_the_receiver() {
        let change = request_update("accepted", Some("pending"));
        assert_eq!(accepted_by("me", &change), Some("alice".to_string()));

        let without_old_status = request_update("accepted", None);
        assert_eq!(
            accepted_by("me", &without_old_status),
            Some("alice".to_string())
        );
    }

    #[test]
    fn other_updates_raise_nothing() {
        assert_eq!(accepted_by("me", &request_update("rejected", None)), None);
        assert_eq!(
            accepted_by("me", &request_update("accepted", Some("accepted"))),
            None
        );
        assert_eq!(accepted_by("alice", &request_update("accepted", None)), None);

        let mut insert = request_update("accepted", None);
        insert.kind = ChangeKind::Insert;
        assert_eq!(accepted_by("me", &insert), None);
    }

    #[test]
    fn listens_to_three_feeds() {
        let filters = lifecycle_filters("me");

        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].topic(), "realtime:friend_requests:to_user_id=eq.me");
        assert_eq!(filters[0].events, vec![ChangeKind::Insert]);
        assert_eq!(filters[1].topic(), "realtime:friend_requests:from_user_id=eq.me");
        assert_eq!(filters[1].events, vec![ChangeKind::Update]);
        assert_eq!(filters[2].topic(), "realtime:friends:user_id=eq.me");
        assert!(filters[2].events.is_empty());
    }
}
