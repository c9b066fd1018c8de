use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch, RwLock},
    task::JoinHandle,
};

use super::{
    friend_requests::{accepted_by, lifecycle_filters, load_friends_list, FriendsListState},
    SocialContext,
};
use crate::{
    components::{
        notifier::Notice,
        realtime::{ChangeFeed, Subscription, TableChange},
    },
    domain::error::CommonError,
};

const CHANGES_QUEUE_SIZE: usize = 64;

/// Keeps the friends list in sync with the backend.
///
/// Every change delivered by the three lifecycle feeds triggers a full reload. Changes are
/// consumed one at a time from a single queue and each reload replaces the whole state.
pub struct FriendsListService {
    state: Arc<RwLock<FriendsListState>>,
    reloads: watch::Receiver<u64>,
    subscriptions: Vec<Subscription>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for FriendsListService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FriendsListService")
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl FriendsListService {
    #[tracing::instrument(name = "Start friends list", skip(ctx, feed))]
    pub async fn start(ctx: Arc<SocialContext>, feed: &dyn ChangeFeed) -> Result<Self, CommonError> {
        let initial = load_friends_list(&ctx).await?;
        let state = Arc::new(RwLock::new(initial));

        let (sink, changes) = mpsc::channel(CHANGES_QUEUE_SIZE);
        let mut subscriptions = Vec::new();
        for filter in lifecycle_filters(ctx.me()) {
            // Subscriptions created so far are cancelled on drop if this one fails
            subscriptions.push(feed.subscribe(filter, sink.clone()).await?);
        }
        drop(sink);

        let (reloads_sender, reloads) = watch::channel(0);
        let worker = tokio::spawn(process_changes(
            ctx,
            state.clone(),
            changes,
            reloads_sender,
        ));

        Ok(Self {
            state,
            reloads,
            subscriptions,
            worker,
        })
    }

    pub async fn snapshot(&self) -> FriendsListState {
        self.state.read().await.clone()
    }

    /// Counts finished reloads. Wait on `changed()` to learn about a fresh state.
    pub fn reloads(&self) -> watch::Receiver<u64> {
        self.reloads.clone()
    }

    pub async fn stop(self) {
        for subscription in self.subscriptions {
            subscription.cancel().await;
        }
        self.worker.abort();
        log::debug!("Friends list > Stopped");
    }
}

async fn process_changes(
    ctx: Arc<SocialContext>,
    state: Arc<RwLock<FriendsListState>>,
    mut changes: mpsc::Receiver<TableChange>,
    reloads: watch::Sender<u64>,
) {
    while let Some(change) = changes.recv().await {
        log::debug!(
            "Friends list > {:?} on {}, reloading",
            change.kind,
            change.table
        );

        if let Some(friend_id) = accepted_by(ctx.me(), &change) {
            let name = ctx.display_name(&friend_id).await;
            ctx.notifier.notify(Notice::RequestAccepted { name });
        }

        match load_friends_list(&ctx).await {
            Ok(fresh) => {
                *state.write().await = fresh;
                reloads.send_modify(|count| *count += 1);
            }
            Err(err) => {
                log::error!("Friends list > Reload failed: {err:?}");
                ctx.notifier.notify(Notice::FriendsListStale);
            }
        }
    }

    log::debug!("Friends list > Change feeds closed");
}
