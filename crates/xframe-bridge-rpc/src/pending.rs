//! The pending-call registry: maps an outstanding `callId` to the resolver
//! for its eventual `REPLY`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_channel::oneshot;
use serde_json::Value;
use xframe_bridge_proto::CallId;

use crate::error::RpcError;

struct Entry {
    method_path: String,
    resolver: oneshot::Sender<Result<Value, RpcError>>,
}

/// Shared pending-call table. Cloning shares the same underlying registry.
#[derive(Clone, Default)]
pub struct PendingCalls {
    entries: Rc<RefCell<HashMap<CallId, Entry>>>,
}

impl PendingCalls {
    /// Registers a new pending call, returning the receiver half the caller
    /// awaits.
    pub fn register(
        &self,
        call_id: CallId,
        method_path: String,
    ) -> oneshot::Receiver<Result<Value, RpcError>> {
        let (tx, rx) = oneshot::channel();
        self.entries.borrow_mut().insert(
            call_id,
            Entry {
                method_path,
                resolver: tx,
            },
        );
        rx
    }

    /// Removes a registered call without resolving it (used when the send
    /// itself failed, or on timeout).
    pub fn remove(&self, call_id: &CallId) -> Option<String> {
        self.entries
            .borrow_mut()
            .remove(call_id)
            .map(|e| e.method_path)
    }

    /// Resolves a pending call from an inbound `REPLY`. A missing `callId`
    /// (already timed out, already destroyed) is a silent no-op per the
    /// late-reply policy: stale replies are silently ignored.
    pub fn resolve(&self, call_id: &CallId, result: Result<Value, RpcError>) {
        if let Some(entry) = self.entries.borrow_mut().remove(call_id) {
            let _ = entry.resolver.send(result);
        }
    }

    /// Rejects every currently-pending call with `err` and clears the
    /// registry (used on session destruction).
    pub fn reject_all(&self, err: &RpcError) {
        for (_, entry) in self.entries.borrow_mut().drain() {
            let _ = entry.resolver.send(Err(err.clone()));
        }
    }

    /// Number of currently-outstanding calls (for tests/diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
