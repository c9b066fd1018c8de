mod common;

pub use common::*;
use voice_social::{
    components::{backend::Filter, notifier::Notice},
    domain::{error::CommonError, friend_request::RequestStatus},
    service::friend_requests::{
        accept_request, load_friends_list, reject_request, remove_friend, send_request,
        set_nickname,
    },
};

fn pair(user_id: &str, friend_id: &str) -> Vec<Filter> {
    vec![
        Filter::eq("user_id", user_id),
        Filter::eq("friend_id", friend_id),
    ]
}

fn seeded_backend() -> std::sync::Arc<InMemoryBackend> {
    let backend = InMemoryBackend::new();
    backend.seed("users", user(ME, "me_myself"));
    backend.seed("users", user("alice", "alice_w"));
    backend.seed("users", user("bob", "bobby"));
    backend
}

#[tokio::test]
async fn accepting_creates_both_friendship_rows() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "pending"),
    );
    let (ctx, mut notices) = social_context(backend.clone());

    let request = accept_request(&ctx, "req-1").await.unwrap();

    assert_eq!(request.status, RequestStatus::Accepted);
    assert!(request.responded_at.is_some());
    assert_eq!(backend.rows("friends").len(), 2);
    assert_eq!(backend.rows_where("friends", &pair(ME, "alice")).len(), 1);
    assert_eq!(backend.rows_where("friends", &pair("alice", ME)).len(), 1);
    assert_eq!(
        notices.try_recv().unwrap(),
        Notice::FriendAdded {
            name: "alice_w".to_string()
        }
    );
}

#[tokio::test]
async fn accepting_tolerates_an_existing_direction() {
    let backend = seeded_backend();
    backend.seed("friends", friendship("alice", ME));
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "pending"),
    );
    let (ctx, _notices) = social_context(backend.clone());

    accept_request(&ctx, "req-1").await.unwrap();

    assert_eq!(backend.rows("friends").len(), 2);
}

#[tokio::test]
async fn failed_second_insert_is_compensated() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "pending"),
    );
    backend.fail_inserts_matching("friends", pair("alice", ME));
    let (ctx, mut notices) = social_context(backend.clone());

    let result = accept_request(&ctx, "req-1").await;

    assert_eq!(result, Err(CommonError::Unknown("".to_string())));
    assert!(backend.rows("friends").is_empty());
    let stored = backend.rows("friend_requests");
    assert_eq!(stored[0]["status"], "pending");
    assert!(stored[0]["responded_at"].is_null());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn failed_cleanup_reports_partial_state() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "pending"),
    );
    backend.fail_inserts_matching("friends", pair("alice", ME));
    backend.fail_deletes("friends");
    let (ctx, _notices) = social_context(backend.clone());

    let result = accept_request(&ctx, "req-1").await;

    assert_eq!(result, Err(CommonError::PartiallyApplied("".to_string())));
    assert_eq!(backend.rows_where("friends", &pair(ME, "alice")).len(), 1);
}

#[tokio::test]
async fn failed_revert_reports_partial_state() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "pending"),
    );
    backend.fail_inserts_matching("friends", pair(ME, "alice"));
    backend.fail_updates_matching("friend_requests", vec![Filter::eq("status", "pending")]);
    let (ctx, _notices) = social_context(backend.clone());

    let result = accept_request(&ctx, "req-1").await;

    assert_eq!(result, Err(CommonError::PartiallyApplied("".to_string())));
    assert_eq!(backend.rows("friend_requests")[0]["status"], "accepted");
    assert!(backend.rows("friends").is_empty());
}

#[tokio::test]
async fn only_the_receiver_can_accept() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", ME, "alice", "pending"),
    );
    let (ctx, _notices) = social_context(backend.clone());

    let result = accept_request(&ctx, "req-1").await;

    assert_eq!(result, Err(CommonError::Forbidden("".to_string())));
    assert!(backend.rows("friends").is_empty());
}

#[tokio::test]
async fn answered_requests_cannot_be_answered_again() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "rejected"),
    );
    let (ctx, _notices) = social_context(backend.clone());

    assert_eq!(
        accept_request(&ctx, "req-1").await,
        Err(CommonError::BadRequest("".to_string()))
    );
    assert_eq!(
        reject_request(&ctx, "req-1").await,
        Err(CommonError::BadRequest("".to_string()))
    );
    assert_eq!(
        accept_request(&ctx, "missing").await,
        Err(CommonError::NotFound("".to_string()))
    );
}

#[tokio::test]
async fn rejecting_changes_only_the_status() {
    let backend = seeded_backend();
    backend.seed(
        "friend_requests",
        friend_request("req-1", "alice", ME, "pending"),
    );
    let before = backend.rows("friend_requests")[0].clone();
    let (ctx, mut notices) = social_context(backend.clone());

    let request = reject_request(&ctx, "req-1").await.unwrap();

    assert_eq!(request.status, RequestStatus::Rejected);
    assert!(backend.rows("friends").is_empty());
    assert!(notices.try_recv().is_err());

    let after = backend.rows("friend_requests")[0].clone();
    for column in ["id", "from_user_id", "to_user_id", "created_at"] {
        assert_eq!(after[column], before[column], "{column} changed");
    }
    assert_eq!(after["status"], "rejected");
}

#[tokio::test]
async fn removing_a_friend_keeps_the_reverse_row() {
    let backend = seeded_backend();
    backend.seed("friends", friendship(ME, "alice"));
    backend.seed("friends", friendship("alice", ME));
    backend.seed("friends", friendship(ME, "bob"));
    let (ctx, _notices) = social_context(backend.clone());

    remove_friend(&ctx, "alice").await.unwrap();

    assert!(backend.rows_where("friends", &pair(ME, "alice")).is_empty());
    assert_eq!(backend.rows_where("friends", &pair("alice", ME)).len(), 1);
    assert_eq!(backend.rows_where("friends", &pair(ME, "bob")).len(), 1);
}

#[tokio::test]
async fn sending_a_request_checks_the_pair_first() {
    let backend = seeded_backend();
    backend.seed("friends", friendship(ME, "bob"));
    backend.seed(
        "friend_requests",
        friend_request("req-9", "alice", ME, "pending"),
    );
    let (ctx, _notices) = social_context(backend.clone());

    assert_eq!(
        send_request(&ctx, "a").await,
        Err(CommonError::BadRequest("".to_string()))
    );
    assert_eq!(
        send_request(&ctx, "nobody_here").await,
        Err(CommonError::UserNotFound("".to_string()))
    );
    assert_eq!(
        send_request(&ctx, "me_myself").await,
        Err(CommonError::BadRequest("".to_string()))
    );
    assert_eq!(
        send_request(&ctx, "bobby").await,
        Err(CommonError::BadRequest("".to_string()))
    );
    assert_eq!(
        send_request(&ctx, "alice_w").await,
        Err(CommonError::BadRequest("".to_string()))
    );
    assert_eq!(backend.rows("friend_requests").len(), 1);
}

#[tokio::test]
async fn sent_request_shows_up_as_outgoing() {
    let backend = seeded_backend();
    let (ctx, _notices) = social_context(backend.clone());

    let request = send_request(&ctx, "alice_w").await.unwrap();
    let state = load_friends_list(&ctx).await.unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.to_user_id, "alice");
    assert_eq!(state.outgoing, vec![request]);
    assert!(state.incoming.is_empty());
}

#[tokio::test]
async fn nickname_is_trimmed_and_blank_clears_it() {
    let backend = seeded_backend();
    backend.seed("friends", friendship(ME, "alice"));
    let (ctx, _notices) = social_context(backend.clone());

    let renamed = set_nickname(&ctx, "alice", Some("  Al  ")).await.unwrap();
    assert_eq!(renamed.nickname(), Some("Al"));

    let cleared = set_nickname(&ctx, "alice", Some("   ")).await.unwrap();
    assert_eq!(cleared.nickname(), None);

    assert_eq!(
        set_nickname(&ctx, "bob", Some("B")).await,
        Err(CommonError::NotFound("".to_string()))
    );
}
