use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

/// User-facing alerts raised by the services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The caller accepted a request and is now friends with `name`.
    FriendAdded { name: String },
    /// Someone accepted a request the caller had sent.
    RequestAccepted { name: String },
    /// Anonymous matching paired the caller with someone.
    Matched { user_id: String },
    /// A background refresh of the friends list failed; what is shown may be stale.
    FriendsListStale,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::FriendAdded { name } => write!(f, "You are now friends with {name}"),
            Notice::RequestAccepted { name } => {
                write!(f, "{name} accepted your friend request")
            }
            Notice::Matched { user_id } => write!(f, "You were matched with {user_id}"),
            Notice::FriendsListStale => {
                write!(f, "Couldn't refresh your friends list, try again later")
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        log::info!("Alert > {notice}");
    }
}

/// Forwards alerts to whoever owns the receiving end (a UI loop, a CLI printer, a test).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new(sender: UnboundedSender<Notice>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.sender.send(notice).is_err() {
            log::debug!("Alert > Nobody is listening for alerts anymore");
        }
    }
}
