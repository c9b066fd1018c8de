use chrono::Utc;

use super::{backend_error, SocialContext};
use crate::{
    domain::{
        error::CommonError,
        message::{ExpiryRule, Message},
    },
    entities::messages::NewMessage,
};

/// A voice message ready to be sent. The audio itself was uploaded elsewhere.
#[derive(Debug, Clone)]
pub struct NewVoiceMessage {
    pub recipient_id: Option<String>,
    pub media_url: String,
    pub expiry: ExpiryRule,
}

/// Received messages that haven't expired yet, oldest first.
#[tracing::instrument(name = "Get received messages", skip(ctx))]
pub async fn get_received_messages(ctx: &SocialContext) -> Result<Vec<Message>, CommonError> {
    let now = Utc::now();
    let messages = ctx
        .repos
        .messages
        .get_received(ctx.me())
        .await
        .map_err(|err| backend_error("Get received messages", err))?;

    Ok(messages
        .into_iter()
        .filter(|message| !message.is_expired(now))
        .collect())
}

#[tracing::instrument(name = "Send voice message", skip(ctx))]
pub async fn send_voice_message(
    ctx: &SocialContext,
    message: NewVoiceMessage,
) -> Result<Message, CommonError> {
    let recipient_id = message
        .recipient_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CommonError::BadRequest("Choose who gets the message".to_owned()))?;

    if message.media_url.trim().is_empty() {
        return Err(CommonError::BadRequest(
            "Record a message before sending it".to_owned(),
        ));
    }
    message.expiry.validate()?;

    let me = ctx.me();
    let is_friend = ctx
        .repos
        .friendships
        .get_friendship(me, recipient_id)
        .await
        .map_err(|err| backend_error("Send voice message", err))?
        .is_some();
    if !is_friend {
        return Err(CommonError::Forbidden(
            "You can only send messages to your friends".to_owned(),
        ));
    }

    ctx.repos
        .messages
        .create(NewMessage {
            sender_id: me,
            recipient_id,
            content: None,
            media_url: Some(message.media_url.trim()),
            expiry: message.expiry,
        })
        .await
        .map_err(|err| backend_error("Send voice message", err))
}

/// Records one playback by the recipient. The first listen sets `listened_at`.
#[tracing::instrument(name = "Mark message listened", skip(ctx))]
pub async fn mark_listened(ctx: &SocialContext, message_id: &str) -> Result<Message, CommonError> {
    let not_found = || CommonError::NotFound(format!("Message {message_id} not found"));

    let message = ctx
        .repos
        .messages
        .get(message_id)
        .await
        .map_err(|err| backend_error("Mark message listened", err))?
        .ok_or_else(not_found)?;

    if message.recipient_id != ctx.me() {
        return Err(CommonError::Forbidden(
            "Only the recipient can listen to this message".to_owned(),
        ));
    }

    let now = Utc::now();
    if message.is_expired(now) {
        return Err(CommonError::NotFound("This message has expired".to_owned()));
    }

    ctx.repos
        .messages
        .mark_listened(
            message_id,
            message.listened_at.unwrap_or(now),
            message.play_count + 1,
        )
        .await
        .map_err(|err| backend_error("Mark message listened", err))?
        .ok_or_else(not_found)
}
