use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};

use crate::request::{HeldRequest, HeldSummary, RequestId};

/// A held request plus the one-shot signal that resumes its worker.
///
/// Releasing hands the worker the request as it stands at that moment, so any
/// operator mutations made while it was held travel with it.
struct RequestHandle {
    request: HeldRequest,
    signal: Option<oneshot::Sender<HeldRequest>>,
}

#[derive(Default)]
struct Entries {
    handles: HashMap<RequestId, RequestHandle>,
    next_id: u64,
}

/// Requests held during one capture epoch, keyed by epoch-scoped id.
///
/// Every operation takes the same lock. The current size is published on a
/// `watch` channel so a drain waiter sees the transition to zero without
/// polling, whether it subscribes before or after the last removal.
pub struct Registry {
    entries: Mutex<Entries>,
    size_tx: watch::Sender<usize>,
}

impl Registry {
    pub fn new() -> Self {
        let (size_tx, _) = watch::channel(0);
        Self {
            entries: Mutex::new(Entries::default()),
            size_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request and return its id together with the receiving half
    /// of its release signal.
    pub fn insert(&self, request: HeldRequest) -> (RequestId, oneshot::Receiver<HeldRequest>) {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.lock();
        let id = RequestId(entries.next_id);
        entries.next_id += 1;
        entries.handles.insert(
            id,
            RequestHandle {
                request,
                signal: Some(tx),
            },
        );
        self.size_tx.send_replace(entries.handles.len());
        (id, rx)
    }

    pub fn get(&self, id: RequestId) -> Option<HeldRequest> {
        self.lock().handles.get(&id).map(|h| h.request.clone())
    }

    /// Run `f` against the held request while the registry lock is held.
    pub fn with_request<R>(&self, id: RequestId, f: impl FnOnce(&mut HeldRequest) -> R) -> Option<R> {
        self.lock().handles.get_mut(&id).map(|h| f(&mut h.request))
    }

    pub fn remove(&self, id: RequestId) -> Option<HeldRequest> {
        let mut entries = self.lock();
        let removed = entries.handles.remove(&id)?;
        self.size_tx.send_replace(entries.handles.len());
        Some(removed.request)
    }

    /// Summaries of every held request, ordered by id.
    pub fn snapshot(&self) -> Vec<HeldSummary> {
        let entries = self.lock();
        let mut list: Vec<HeldSummary> = entries
            .handles
            .iter()
            .map(|(id, h)| h.request.summary(*id))
            .collect();
        list.sort_by_key(|s| s.id);
        list
    }

    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire the signal of every registered handle that has not been fired yet.
    /// Returns the number of handles registered at that moment.
    pub(crate) fn signal_all(&self) -> usize {
        let mut entries = self.lock();
        for handle in entries.handles.values_mut() {
            if let Some(signal) = handle.signal.take() {
                // The worker may already be gone; its guard removes the entry.
                let _ = signal.send(handle.request.clone());
            }
        }
        entries.handles.len()
    }

    /// Resolve once the registry is empty. Returns immediately if it already is.
    pub async fn drained(&self) {
        let mut size_rx = self.size_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = size_rx.wait_for(|size| *size == 0).await;
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
