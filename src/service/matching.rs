use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};

use super::{backend_error, friend_requests::create_friendship_pair, SocialContext};
use crate::{
    components::notifier::Notice,
    domain::{
        error::CommonError,
        matching::{MatchOutcome, MatchingState},
    },
};

/// Anonymous matching for the signed in user.
///
/// Only one search runs at a time: `start` is refused while the state is `Searching`.
pub struct MatchingService {
    ctx: Arc<SocialContext>,
    state: Arc<watch::Sender<MatchingState>>,
    runs: Arc<AtomicU64>,
}

impl std::fmt::Debug for MatchingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingService")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl MatchingService {
    pub fn new(ctx: Arc<SocialContext>) -> Self {
        let (state, _) = watch::channel(MatchingState::default());
        Self {
            ctx,
            state: Arc::new(state),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> MatchingState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MatchingState> {
        self.state.subscribe()
    }

    /// Asks the backend for a partner once. With no immediate pairing a background task polls the
    /// status table at a fixed interval until a partner shows up, the attempts run out or the
    /// returned handle is cancelled.
    #[tracing::instrument(name = "Start matching", skip(self))]
    pub async fn start(&self) -> Result<MatchHandle, CommonError> {
        let max_attempts = self.ctx.matching.max_attempts;
        let mut run_id = 0;
        let claimed = self.state.send_if_modified(|state| {
            if state.is_searching() {
                false
            } else {
                run_id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
                *state = MatchingState::Searching {
                    attempts_left: max_attempts,
                    next_poll_at: None,
                };
                true
            }
        });
        if !claimed {
            return Err(CommonError::BadRequest(
                "Already looking for a match".to_owned(),
            ));
        }
        let run = SearchRun {
            state: self.state.clone(),
            runs: self.runs.clone(),
            id: run_id,
        };

        let me = self.ctx.me();
        let immediate = self
            .ctx
            .repos
            .matchmaking
            .request_match(&self.ctx.matching.procedure, me)
            .await;

        match immediate {
            Err(err) => {
                run.publish(MatchingState::Idle);
                Err(backend_error("Start matching", err))
            }
            Ok(Some(partner)) => {
                if let Err(err) = create_friendship_pair(&self.ctx.repos, me, &partner).await {
                    run.publish(MatchingState::Idle);
                    return Err(err);
                }

                log::info!("Matching > {me} paired with {partner} right away");
                self.ctx.notifier.notify(Notice::Matched {
                    user_id: partner.clone(),
                });
                run.publish(MatchingState::Matched {
                    user_id: partner.clone(),
                });

                Ok(MatchHandle {
                    state: self.state.subscribe(),
                    run: None,
                    stop: None,
                    task: None,
                    settled: Some(MatchOutcome::Matched(partner)),
                })
            }
            Ok(None) => {
                let (stop, stopped) = oneshot::channel();
                let task = tokio::spawn(poll_for_match(self.ctx.clone(), run.clone(), stopped));

                Ok(MatchHandle {
                    state: self.state.subscribe(),
                    run: Some(run),
                    stop: Some(stop),
                    task: Some(task),
                    settled: None,
                })
            }
        }
    }
}

/// One search's write access to the shared state. Writes from a search that was cancelled,
/// or replaced by a newer one, are dropped.
#[derive(Debug, Clone)]
struct SearchRun {
    state: Arc<watch::Sender<MatchingState>>,
    runs: Arc<AtomicU64>,
    id: u64,
}

impl SearchRun {
    fn publish(&self, next: MatchingState) -> bool {
        self.state.send_if_modified(|state| {
            if self.runs.load(Ordering::SeqCst) != self.id {
                return false;
            }
            *state = next;
            true
        })
    }

    /// Frees the state for the next search right away. A finished search keeps its result.
    fn release(&self) {
        self.state.send_if_modified(|state| {
            if self.runs.load(Ordering::SeqCst) != self.id || !state.is_searching() {
                return false;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            *state = MatchingState::Idle;
            true
        });
    }
}

async fn poll_for_match(
    ctx: Arc<SocialContext>,
    run: SearchRun,
    mut stopped: oneshot::Receiver<()>,
) -> MatchOutcome {
    let me = ctx.me();
    let every = Duration::from_millis(ctx.matching.poll_interval_ms);
    let max_attempts = ctx.matching.max_attempts;

    for attempt in 0..max_attempts {
        let next_poll_at = Instant::now() + every;
        run.publish(MatchingState::Searching {
            attempts_left: max_attempts - attempt,
            next_poll_at: Some(next_poll_at),
        });

        tokio::select! {
            // A dropped handle closes the channel, which also ends the search
            _ = &mut stopped => {
                log::debug!("Matching > Search for {me} cancelled");
                run.release();
                return MatchOutcome::Cancelled;
            }
            _ = sleep_until(next_poll_at) => {}
        }

        match ctx
            .repos
            .matchmaking
            .get_matched_user(&ctx.matching.status_table, me)
            .await
        {
            Ok(Some(partner)) => {
                if !run.publish(MatchingState::Matched {
                    user_id: partner.clone(),
                }) {
                    log::debug!("Matching > Search for {me} cancelled before {partner} showed up");
                    return MatchOutcome::Cancelled;
                }
                log::info!("Matching > {me} paired with {partner} after {} polls", attempt + 1);
                ctx.notifier.notify(Notice::Matched {
                    user_id: partner.clone(),
                });
                return MatchOutcome::Matched(partner);
            }
            Ok(None) => {}
            Err(err) => log::error!("Matching > Poll {} failed: {err}", attempt + 1),
        }
    }

    log::debug!("Matching > No match for {me} after {max_attempts} polls");
    run.publish(MatchingState::Idle);
    MatchOutcome::TimedOut
}

/// A running (or already finished) search. Dropping it cancels the search.
#[derive(Debug)]
pub struct MatchHandle {
    state: watch::Receiver<MatchingState>,
    run: Option<SearchRun>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<MatchOutcome>>,
    settled: Option<MatchOutcome>,
}

impl MatchHandle {
    pub fn state(&self) -> MatchingState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MatchingState> {
        self.state.clone()
    }

    /// Stops polling. The state goes back to `Idle` at once, so a new search may start
    /// without waiting for `outcome`.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(run) = self.run.take() {
            run.release();
        }
    }

    /// Waits for the search to end.
    pub async fn outcome(mut self) -> MatchOutcome {
        if let Some(outcome) = self.settled.take() {
            return outcome;
        }

        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|err| {
                log::error!("Matching > Poller task failed: {err}");
                MatchOutcome::Cancelled
            }),
            None => MatchOutcome::Cancelled,
        }
    }
}

impl Drop for MatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
