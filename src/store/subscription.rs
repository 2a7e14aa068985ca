//! Push-based job query subscriptions.
//!
//! [`subscribe`] spawns a delivery task that sends an initial snapshot of a
//! [`JobQuery`], then re-runs the query whenever the store reports a change
//! and sends the new result only when it differs from the last one sent.
//! Dropping the [`Subscription`] aborts the task.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{JobQuery, RecordStore, StoreChange};
use crate::domain::Job;
use crate::error::MarketError;

/// Snapshots buffered per subscription before the task waits for the
/// consumer.
const SNAPSHOT_BUFFER: usize = 16;

/// A live job query. Yields one `Vec<Job>` per distinct result.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Result<Vec<Job>, MarketError>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Waits for the next snapshot. Returns `None` once the subscription was
    /// cancelled or the store's change feed closed.
    ///
    /// A store failure while re-running the query is delivered as `Err` and
    /// the subscription keeps going.
    pub async fn next(&mut self) -> Option<Result<Vec<Job>, MarketError>> {
        self.receiver.recv().await
    }

    /// Stops delivery. Snapshots already buffered are discarded.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }

    /// Returns `true` once the delivery task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribes to `query` on `store`.
///
/// The change feed is attached before the initial query runs, so no commit
/// between the two is missed.
#[must_use]
pub fn subscribe(store: Arc<dyn RecordStore>, query: JobQuery) -> Subscription {
    let (sender, receiver) = mpsc::channel(SNAPSHOT_BUFFER);
    let changes = store.changes();
    let task = tokio::spawn(deliver(store, query, changes, sender));
    Subscription { receiver, task }
}

async fn deliver(
    store: Arc<dyn RecordStore>,
    query: JobQuery,
    mut changes: broadcast::Receiver<StoreChange>,
    sender: mpsc::Sender<Result<Vec<Job>, MarketError>>,
) {
    debug!(?query, "subscription started");
    let mut last: Option<Vec<Job>> = None;

    loop {
        match store.query_jobs(&query).await {
            Ok(jobs) if last.as_ref() == Some(&jobs) => {}
            Ok(jobs) => {
                last = Some(jobs.clone());
                if sender.send(Ok(jobs)).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "subscription query failed");
                if sender.send(Err(err)).await.is_err() {
                    break;
                }
            }
        }

        tokio::select! {
            () = sender.closed() => break,
            change = changes.recv() => match change {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged behind the change feed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(?query, "subscription stopped");
}
