//! The mutation stream: a best-effort audit log of state changes a
//! `Repository` makes, for callers that want to observe writes without
//! polling the filesystem.

use git_hash::ObjectId;

/// A single recorded state change. Ordering is only guaranteed within one
/// producer (one `Repository`), never across repositories or processes.
#[derive(Debug, Clone)]
pub enum Mutation {
    RefUpdated {
        name: String,
        old: ObjectId,
        new: ObjectId,
    },
    RefDeleted {
        name: String,
    },
    ObjectWritten {
        oid: ObjectId,
    },
    IndexWritten,
    CheckoutCompleted {
        tree: ObjectId,
    },
    MergeAborted,
}

/// Per-repository publish/subscribe point for [`Mutation`] events.
///
/// Subscribers each get their own bounded channel; a slow or absent
/// subscriber never blocks the producer — `publish` drops the event for
/// channels that are full rather than waiting.
pub struct MutationSink {
    subscribers: std::sync::Mutex<Vec<crossbeam::channel::Sender<Mutation>>>,
}

impl Default for MutationSink {
    fn default() -> Self {
        Self {
            subscribers: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl MutationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to future mutations. The returned receiver holds up to
    /// `capacity` unread events before `publish` starts dropping for it.
    pub fn subscribe(&self, capacity: usize) -> crossbeam::channel::Receiver<Mutation> {
        let (tx, rx) = crossbeam::channel::bounded(capacity.max(1));
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Record a mutation, fanning it out to every live subscriber.
    pub fn publish(&self, event: Mutation) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| {
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(crossbeam::channel::TrySendError::Full(_)) => true,
                Err(crossbeam::channel::TrySendError::Disconnected(_)) => false,
            }
        });
    }
}
