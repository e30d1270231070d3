//! Runs searches off the interactive thread, newest query wins.
//!
//! Every submission gets a sequence number. Submitting again aborts the
//! previous task where it can, and a result that finishes after a newer
//! submission is dropped instead of being delivered.

use crate::engine::QueryEngine;
use crate::error::QueryError;
use crate::models::ItemSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug)]
pub struct SearchOutcome {
    pub seq: u64,
    pub query: String,
    pub result: Result<ItemSet, QueryError>,
}

#[derive(Debug, Default)]
struct Sequencer {
    latest: AtomicU64,
    delivered: Mutex<u64>,
}

impl Sequencer {
    fn next(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, seq: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == seq
    }

    /// Sends `outcome` only if nothing newer was submitted or delivered.
    async fn deliver(&self, outcome: SearchOutcome, tx: &mpsc::Sender<SearchOutcome>) -> bool {
        let mut delivered = self.delivered.lock().await;
        if !self.is_current(outcome.seq) || outcome.seq <= *delivered {
            debug!(seq = outcome.seq, query = %outcome.query, "dropping superseded search result");
            return false;
        }
        let seq = outcome.seq;
        if tx.send(outcome).await.is_err() {
            debug!(seq, "search result receiver closed");
            return false;
        }
        *delivered = seq;
        true
    }
}

pub struct SearchDispatcher {
    engine: Arc<QueryEngine>,
    sequencer: Arc<Sequencer>,
    tx: mpsc::Sender<SearchOutcome>,
    inflight: StdMutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl SearchDispatcher {
    /// Must be created inside a tokio runtime; `submit` may then be called from any thread.
    pub fn new(engine: Arc<QueryEngine>) -> (Self, mpsc::Receiver<SearchOutcome>) {
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Self {
            engine,
            sequencer: Arc::new(Sequencer::default()),
            tx,
            inflight: StdMutex::new(None),
            runtime: Handle::current(),
        };
        (dispatcher, rx)
    }

    /// Starts evaluating `query` and returns its sequence number.
    pub fn submit(&self, query: impl Into<String>) -> u64 {
        let query = query.into();
        let seq = self.sequencer.next();
        let engine = Arc::clone(&self.engine);
        let sequencer = Arc::clone(&self.sequencer);
        let tx = self.tx.clone();

        let handle = self.runtime.spawn(async move {
            let result = engine.search(&query).await;
            sequencer
                .deliver(SearchOutcome { seq, query, result }, &tx)
                .await;
        });
        self.swap_inflight(Some(handle));
        seq
    }

    /// Supersedes whatever is in flight without starting anything new.
    pub fn cancel(&self) {
        self.sequencer.next();
        self.swap_inflight(None);
    }

    /// Sequence number of the most recent submission.
    pub fn latest(&self) -> u64 {
        self.sequencer.latest.load(Ordering::SeqCst)
    }

    fn swap_inflight(&self, next: Option<JoinHandle<()>>) {
        let previous = match self.inflight.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        if let Some(handle) = previous {
            // A blocking evaluation already running finishes on its own; its
            // result is then rejected by the sequencer.
            handle.abort();
        }
    }
}
