use tokio::time::Instant;

/// What the anonymous matching screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MatchingState {
    #[default]
    Idle,
    Searching {
        attempts_left: u32,
        next_poll_at: Option<Instant>,
    },
    Matched {
        user_id: String,
    },
}

impl MatchingState {
    pub fn is_searching(&self) -> bool {
        matches!(self, MatchingState::Searching { .. })
    }
}

/// How a matching run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(String),
    TimedOut,
    Cancelled,
}
