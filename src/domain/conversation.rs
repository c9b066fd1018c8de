use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{friendship::Friendship, message::Message};

pub const FRIEND_PLACEHOLDER_PREVIEW: &str = "Tap to send a message";
pub const VOICE_MESSAGE_PREVIEW: &str = "New voice message";

/// A row of the messages screen: one per counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationItem {
    pub counterpart_id: String,
    pub display_name: String,
    pub preview: String,
    /// Set when the latest message hasn't been listened to yet.
    pub unread: bool,
    pub message_id: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Conversation items keyed by counterpart, kept in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct ConversationMap {
    items: Vec<ConversationItem>,
    index: HashMap<String, usize>,
}

impl ConversationMap {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, counterpart_id: &str) -> Option<&ConversationItem> {
        self.index
            .get(counterpart_id)
            .map(|position| &self.items[*position])
    }

    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ConversationItem> {
        self.items
    }

    fn get_mut(&mut self, counterpart_id: &str) -> Option<&mut ConversationItem> {
        match self.index.get(counterpart_id) {
            Some(position) => self.items.get_mut(*position),
            None => None,
        }
    }

    fn insert(&mut self, item: ConversationItem) {
        match self.index.get(&item.counterpart_id) {
            Some(position) => self.items[*position] = item,
            None => {
                self.index
                    .insert(item.counterpart_id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }
}

fn display_name(counterpart_id: &str, usernames: &HashMap<String, String>) -> String {
    usernames
        .get(counterpart_id)
        .cloned()
        .unwrap_or_else(|| counterpart_id.to_string())
}

/// Merges the caller's friends and messages into one item per counterpart.
///
/// Friends seed placeholder items. Messages are applied in the given order on top: a message
/// always replaces a friend placeholder and a later message replaces an earlier one for the
/// same counterpart, so callers pass messages oldest first.
pub fn merge_conversations(
    user_id: &str,
    friends: &[Friendship],
    messages: &[Message],
    usernames: &HashMap<String, String>,
) -> ConversationMap {
    let mut conversations = ConversationMap::default();

    for friendship in friends {
        let counterpart_id = if friendship.user_id == user_id {
            friendship.friend_id.as_str()
        } else {
            friendship.user_id.as_str()
        };

        let display_name = friendship
            .nickname()
            .map(str::to_string)
            .unwrap_or_else(|| display_name(counterpart_id, usernames));

        conversations.insert(ConversationItem {
            counterpart_id: counterpart_id.to_string(),
            display_name,
            preview: FRIEND_PLACEHOLDER_PREVIEW.to_string(),
            unread: false,
            message_id: None,
            last_activity: friendship.created_at,
        });
    }

    for message in messages {
        let counterpart_id = message.counterpart(user_id);

        match conversations.get_mut(counterpart_id) {
            Some(item) => {
                item.preview = VOICE_MESSAGE_PREVIEW.to_string();
                item.unread = !message.is_listened();
                item.message_id = Some(message.id.clone());
                item.last_activity = Some(message.created_at);
            }
            None => conversations.insert(ConversationItem {
                counterpart_id: counterpart_id.to_string(),
                display_name: display_name(counterpart_id, usernames),
                preview: VOICE_MESSAGE_PREVIEW.to_string(),
                unread: !message.is_listened(),
                message_id: Some(message.id.clone()),
                last_activity: Some(message.created_at),
            }),
        }
    }

    conversations
}
