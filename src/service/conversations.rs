use std::collections::HashSet;

use chrono::Utc;

use super::{backend_error, SocialContext};
use crate::domain::{
    conversation::{merge_conversations, ConversationMap},
    error::CommonError,
};

/// Builds the messages screen: one item per friend or sender, expired messages left out.
#[tracing::instrument(name = "Load conversations", skip(ctx))]
pub async fn load_conversations(ctx: &SocialContext) -> Result<ConversationMap, CommonError> {
    let me = ctx.me();
    let (friends, messages) = tokio::try_join!(
        ctx.repos.friendships.get_user_friends(me),
        ctx.repos.messages.get_received(me),
    )
    .map_err(|err| backend_error("Load conversations", err))?;

    let now = Utc::now();
    let messages: Vec<_> = messages
        .into_iter()
        .filter(|message| !message.is_expired(now))
        .collect();

    let mut counterparts: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let ids = friends
        .iter()
        .map(|friendship| friendship.friend_id.as_str())
        .chain(messages.iter().map(|message| message.counterpart(me)));
    for id in ids {
        if seen.insert(id) {
            counterparts.push(id.to_string());
        }
    }

    let usernames = ctx
        .repos
        .users
        .get_usernames(&counterparts)
        .await
        .map_err(|err| backend_error("Load conversations", err))?;

    Ok(merge_conversations(me, &friends, &messages, &usernames))
}
