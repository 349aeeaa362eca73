//! Outstanding-call table for one endpoint.
//!
//! Every Request sent on an endpoint registers a [`PendingCall`] here. The
//! call ends in exactly one of: resolved by its Ack, expired, canceled, or
//! drained on close. Whichever path removes the entry from the table owns
//! its completion sender, so the completion fires at most once and a late
//! Ack for a removed id is a no-op.
//!
//! Reply handlers are `Send` but not `Sync`, so the table lives behind a
//! `Mutex`.

use std::collections::HashMap;
use std::time::Duration;

use gale_core::{CallError, MessageId};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Result delivered to whoever waits on a pending call: the raw success
/// payload, or why there is none.
pub type CallResult = Result<String, CallError>;

/// Decodes a success payload and hands it to the caller's callback.
pub type ReplyHandler = Box<dyn FnOnce(&str) -> Result<(), CallError> + Send>;

struct PendingCall {
    reply: Option<ReplyHandler>,
    done: oneshot::Sender<CallResult>,
}

impl PendingCall {
    fn complete(self, result: CallResult) {
        // The waiter may already be gone (async watcher timed out first).
        let _ = self.done.send(result);
    }
}

/// Caller's side of a registered call.
#[derive(Debug)]
pub struct PendingHandle {
    id: MessageId,
    deadline: Instant,
    rx: oneshot::Receiver<CallResult>,
}

impl PendingHandle {
    /// Id to put on the outgoing Request.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// When the call expires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Split into the id, deadline and completion receiver.
    pub fn into_parts(self) -> (MessageId, Instant, oneshot::Receiver<CallResult>) {
        (self.id, self.deadline, self.rx)
    }
}

/// Table of outstanding calls keyed by message id.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<MessageId, PendingCall>>,
}

impl Correlator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id and register a call under it.
    ///
    /// `reply` runs on a success Ack before the completion fires; synchronous
    /// callers pass `None` and decode the payload themselves.
    pub fn register(&self, reply: Option<ReplyHandler>, timeout: Duration) -> PendingHandle {
        let (done, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        let id = loop {
            let candidate = MessageId::new();
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        let _ = pending.insert(id.clone(), PendingCall { reply, done });
        PendingHandle { id, deadline, rx }
    }

    fn take(&self, id: &str) -> Option<PendingCall> {
        self.pending.lock().remove(id)
    }

    /// Complete a call from its Ack. Returns `false` for unknown ids (late
    /// replies after a timeout, or ids this side never issued).
    pub fn resolve(&self, id: &str, success: bool, payload: String) -> bool {
        let Some(mut call) = self.take(id) else {
            debug!(id, "ack for unknown or expired call");
            return false;
        };
        if !success {
            call.complete(Err(CallError::Remote(payload)));
            return true;
        }
        let outcome = match call.reply.take() {
            Some(reply) => reply(&payload).map(|()| payload),
            None => Ok(payload),
        };
        call.complete(outcome);
        true
    }

    /// Expire a call whose deadline passed.
    pub fn expire(&self, id: &str) -> bool {
        self.finish(id, CallError::Timeout)
    }

    /// Cancel a call on behalf of its caller.
    pub fn cancel(&self, id: &str) -> bool {
        self.finish(id, CallError::Canceled)
    }

    /// Drop a call that was never sent. Nobody is told.
    pub fn forget(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    fn finish(&self, id: &str, error: CallError) -> bool {
        match self.take(id) {
            Some(call) => {
                call.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding call with [`CallError::Closed`].
    pub fn drain(&self) -> usize {
        let calls: Vec<PendingCall> = self.pending.lock().drain().map(|(_, c)| c).collect();
        let count = calls.len();
        for call in calls {
            call.complete(Err(CallError::Closed));
        }
        count
    }

    /// Whether `id` is still outstanding.
    pub fn contains(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no calls are outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
