//! The handshake state machine: pairing, leader election, and teardown.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures_channel::oneshot;
use tracing::{debug, info, warn};
use xframe_bridge_messenger::Messenger;
use xframe_bridge_proto::{Envelope, MessageType, ParticipantId};
use xframe_bridge_rpc::{Clock, MethodTable, PendingCalls, RemoteProxy, RpcError};

use crate::error::SessionError;

/// The handshake/session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `SYN` emitted, handshake timeout armed, waiting for the peer's `SYN`.
    Initiating,
    /// Paired with a peer; leader has emitted `ACK1`, waiting to complete.
    Paired,
    /// Follower has emitted `ACK2`, about to transition unconditionally to
    /// `Established`.
    EstablishingFollower,
    /// Handshake complete; the RPC proxy is live.
    Established,
    /// The handshake did not complete before its timeout. Terminal.
    Failed,
    /// `destroy` was called, locally or by the peer's `DESTROY`. Terminal.
    Destroyed,
}

struct Inner<P: xframe_bridge_messenger::MessagePort> {
    messenger: Messenger<P>,
    own_participant_id: ParticipantId,
    state: RefCell<SessionState>,
    paired_participant_id: RefCell<Option<ParticipantId>>,
    handshake_completed: Cell<bool>,
    method_table: Option<MethodTable>,
    pending_calls: PendingCalls,
    clock: Rc<dyn Clock>,
    call_timeout: Option<Duration>,
    proxy: RefCell<Option<Rc<RemoteProxy<P>>>>,
    establish_waiters: RefCell<Vec<(u64, oneshot::Sender<Result<(), SessionError>>)>>,
    next_waiter_id: Cell<u64>,
    on_destroyed: RefCell<Option<Box<dyn Fn()>>>,
}

/// Pairs with exactly one peer over a [`Messenger`], establishes an RPC
/// channel, owns it, and tears it down.
///
/// Cloning shares the same underlying state (an `Rc` internally), mirroring
/// [`Messenger`]'s own cloning contract.
pub struct Session<P: xframe_bridge_messenger::MessagePort> {
    inner: Rc<Inner<P>>,
}

impl<P: xframe_bridge_messenger::MessagePort> Clone for Session<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: xframe_bridge_messenger::MessagePort + 'static> Session<P> {
    /// Constructs a session, sends the opening `SYN`, and installs the
    /// inbound handshake/dispatch handler. Handshake progress is observed by
    /// awaiting [`Session::establish`].
    #[must_use]
    pub fn new(
        messenger: Messenger<P>,
        own_participant_id: ParticipantId,
        method_table: Option<MethodTable>,
        clock: Rc<dyn Clock>,
        call_timeout: Option<Duration>,
    ) -> Self {
        let inner = Rc::new(Inner {
            messenger,
            own_participant_id,
            state: RefCell::new(SessionState::Initiating),
            paired_participant_id: RefCell::new(None),
            handshake_completed: Cell::new(false),
            method_table,
            pending_calls: PendingCalls::default(),
            clock,
            call_timeout,
            proxy: RefCell::new(None),
            establish_waiters: RefCell::new(Vec::new()),
            next_waiter_id: Cell::new(0),
            on_destroyed: RefCell::new(None),
        });

        let session = Self { inner };
        session.install_handler();
        session.emit_syn();
        session
    }

    fn install_handler(&self) {
        let inner = Rc::clone(&self.inner);
        self.inner.messenger.add_handler(move |envelope: &Envelope| {
            handle_inbound(&inner, envelope);
        });
    }

    fn emit_syn(&self) {
        let envelope = Envelope::new(self.inner.own_participant_id.clone(), MessageType::Syn);
        self.inner.messenger.send_message(&envelope, None);
    }

    /// Awaits handshake completion, racing the configured timeout.
    ///
    /// Resolves `Ok` with the live proxy once `ESTABLISHED`, or `Err` if the
    /// timeout elapses first or the session is destroyed beforehand.
    ///
    /// Safe to call concurrently from more than one caller (e.g. a
    /// background driver task and a directly-awaiting consumer): each call
    /// registers its own waiter, so one caller's timeout or resolution never
    /// cancels another's.
    pub async fn establish(
        &self,
        handshake_timeout: Duration,
    ) -> Result<Rc<RemoteProxy<P>>, SessionError> {
        if let Some(proxy) = self.inner.proxy.borrow().clone() {
            return Ok(proxy);
        }
        if *self.inner.state.borrow() == SessionState::Failed
            || *self.inner.state.borrow() == SessionState::Destroyed
        {
            return Err(SessionError::Destroyed);
        }

        let waiter_id = self.inner.next_waiter_id.get();
        self.inner.next_waiter_id.set(waiter_id + 1);
        let (tx, rx) = oneshot::channel();
        self.inner.establish_waiters.borrow_mut().push((waiter_id, tx));

        let timeout_ms = u64::try_from(handshake_timeout.as_millis()).unwrap_or(u64::MAX);
        futures_util::pin_mut!(rx);
        let delay = self.inner.clock.delay(handshake_timeout);
        futures_util::pin_mut!(delay);
        match futures_util::future::select(rx, delay).await {
            futures_util::future::Either::Left((result, _)) => match result {
                Ok(Ok(())) => self
                    .inner
                    .proxy
                    .borrow()
                    .clone()
                    .ok_or(SessionError::Destroyed),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(SessionError::Destroyed),
            },
            futures_util::future::Either::Right(((), _)) => {
                self.inner
                    .establish_waiters
                    .borrow_mut()
                    .retain(|(id, _)| *id != waiter_id);
                if *self.inner.state.borrow() != SessionState::Established {
                    warn!(timeout_ms, "handshake timed out");
                    transition(&self.inner, SessionState::Failed);
                }
                Err(SessionError::HandshakeTimeout { timeout_ms })
            }
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// The live proxy, if the handshake has completed.
    #[must_use]
    pub fn proxy(&self) -> Option<Rc<RemoteProxy<P>>> {
        self.inner.proxy.borrow().clone()
    }

    /// Tears the session down: idempotent, emits a
    /// best-effort `DESTROY` if the handshake had completed, tears down the
    /// messenger, and rejects all in-flight RPC calls.
    pub fn destroy(&self) {
        destroy_inner(&self.inner);
    }

    /// Registers a callback fired exactly once, the first time this session
    /// transitions to `Destroyed` — whether from a local [`Session::destroy`]
    /// call or from the peer's own `DESTROY` message. Lets an owner (e.g. a
    /// `Bridge`) keep its own state consistent with a teardown it did not
    /// itself initiate. Replaces any previously registered callback.
    pub fn on_destroyed(&self, callback: impl Fn() + 'static) {
        *self.inner.on_destroyed.borrow_mut() = Some(Box::new(callback));
    }
}

fn destroy_inner<P: xframe_bridge_messenger::MessagePort>(inner: &Rc<Inner<P>>) {
    if *inner.state.borrow() == SessionState::Destroyed {
        return;
    }
    *inner.state.borrow_mut() = SessionState::Destroyed;
    info!("session destroyed");

    if inner.handshake_completed.get() {
        let envelope = Envelope::new(inner.own_participant_id.clone(), MessageType::Destroy);
        inner.messenger.send_message(&envelope, None);
    }
    inner.messenger.destroy();
    if let Some(proxy) = inner.proxy.borrow().as_ref() {
        proxy.invalidate();
    }
    inner.pending_calls.reject_all(&RpcError::Destroyed);
    for (_, tx) in inner.establish_waiters.borrow_mut().drain(..) {
        let _ = tx.send(Err(SessionError::Destroyed));
    }
    if let Some(callback) = inner.on_destroyed.borrow_mut().take() {
        callback();
    }
}

fn transition<P: xframe_bridge_messenger::MessagePort>(
    inner: &Rc<Inner<P>>,
    to: SessionState,
) {
    let from = *inner.state.borrow();
    if from == to {
        return;
    }
    debug!(?from, ?to, "session state transition");
    *inner.state.borrow_mut() = to;
}

fn handle_inbound<P: xframe_bridge_messenger::MessagePort + 'static>(
    inner: &Rc<Inner<P>>,
    envelope: &Envelope,
) {
    let state = *inner.state.borrow();
    if state == SessionState::Destroyed || state == SessionState::Failed {
        return;
    }

    match &envelope.message {
        MessageType::Syn => handle_syn(inner, envelope),
        MessageType::Ack1 { to_participant_id } => {
            if to_participant_id == &inner.own_participant_id
                && is_from_pair(inner, &envelope.from_participant_id)
                && state == SessionState::Paired
            {
                handle_ack1(inner);
            }
        }
        MessageType::Ack2 { to_participant_id } => {
            if to_participant_id == &inner.own_participant_id
                && is_from_pair(inner, &envelope.from_participant_id)
                && state == SessionState::Paired
            {
                handle_ack2(inner);
            }
        }
        MessageType::Destroy => {
            if is_from_pair(inner, &envelope.from_participant_id) {
                info!("peer requested teardown");
                destroy_inner(inner);
            }
        }
        MessageType::Call { id, method_path, args } => {
            if state == SessionState::Established {
                dispatch_call(inner, id, method_path, args.clone());
            }
        }
        MessageType::Reply { call_id, is_error, value } => {
            if state == SessionState::Established {
                let result = if *is_error {
                    Err(RpcError::MethodThrew(
                        value.as_str().map_or_else(|| value.to_string(), ToOwned::to_owned),
                    ))
                } else {
                    Ok(value.clone())
                };
                inner.pending_calls.resolve(call_id, result);
            }
        }
        MessageType::Malformed { type_name } => {
            debug!(%type_name, "dropping recognized message with an invalid payload");
        }
    }
}

fn is_from_pair<P: xframe_bridge_messenger::MessagePort>(
    inner: &Rc<Inner<P>>,
    from: &ParticipantId,
) -> bool {
    inner.paired_participant_id.borrow().as_ref() == Some(from)
}

fn handle_syn<P: xframe_bridge_messenger::MessagePort + 'static>(
    inner: &Rc<Inner<P>>,
    envelope: &Envelope,
) {
    let state = *inner.state.borrow();
    match state {
        SessionState::Initiating => {
            *inner.paired_participant_id.borrow_mut() = Some(envelope.from_participant_id.clone());
            transition(inner, SessionState::Paired);

            // Re-emit SYN so a peer that was not yet listening still sees one.
            let syn = Envelope::new(inner.own_participant_id.clone(), MessageType::Syn);
            inner.messenger.send_message(&syn, None);

            if inner.own_participant_id > envelope.from_participant_id {
                let ack1 = Envelope::new(
                    inner.own_participant_id.clone(),
                    MessageType::Ack1 {
                        to_participant_id: envelope.from_participant_id.clone(),
                    },
                );
                inner.messenger.send_message(&ack1, None);
            }
        }
        // The re-emit-on-SYN behavior is PAIRED's one-time entry action
        // (fired above, on the INITIATING -> PAIRED transition). A further
        // SYN from the already-paired peer is just a no-op here; reacting to
        // it again would re-trigger the peer's own re-emit in an unbounded
        // reentrant loop.
        _ => {}
    }
}

fn handle_ack1<P: xframe_bridge_messenger::MessagePort + 'static>(inner: &Rc<Inner<P>>) {
    transition(inner, SessionState::EstablishingFollower);
    let Some(pair) = inner.paired_participant_id.borrow().clone() else {
        return;
    };
    let ack2 = Envelope::new(
        inner.own_participant_id.clone(),
        MessageType::Ack2 {
            to_participant_id: pair,
        },
    );
    inner.messenger.send_message(&ack2, None);
    complete_handshake(inner);
}

fn handle_ack2<P: xframe_bridge_messenger::MessagePort + 'static>(inner: &Rc<Inner<P>>) {
    complete_handshake(inner);
}

fn complete_handshake<P: xframe_bridge_messenger::MessagePort + 'static>(inner: &Rc<Inner<P>>) {
    transition(inner, SessionState::Established);
    inner.handshake_completed.set(true);

    let proxy = Rc::new(RemoteProxy::new(
        inner.messenger.clone(),
        inner.own_participant_id.clone(),
        inner.pending_calls.clone(),
        Rc::clone(&inner.clock),
        inner.call_timeout,
    ));
    *inner.proxy.borrow_mut() = Some(proxy);

    for (_, tx) in inner.establish_waiters.borrow_mut().drain(..) {
        let _ = tx.send(Ok(()));
    }
}

fn dispatch_call<P: xframe_bridge_messenger::MessagePort>(
    inner: &Rc<Inner<P>>,
    call_id: &str,
    method_path: &[String],
    args: Vec<serde_json::Value>,
) {
    let Some(table) = &inner.method_table else {
        debug!(method_path = ?method_path, "dropping call: no method table configured");
        return;
    };
    let (is_error, value) = match table.invoke(method_path, args) {
        Ok(value) => (false, value),
        Err(err) => (true, serde_json::Value::String(err.to_string())),
    };
    let reply = Envelope::new(
        inner.own_participant_id.clone(),
        MessageType::Reply {
            call_id: call_id.to_owned(),
            is_error,
            value,
        },
    );
    inner.messenger.send_message(&reply, None);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};
    use xframe_bridge_messenger::{AllowedOrigin, AllowedOrigins, LoopbackPort};
    use xframe_bridge_rpc::NativeClock;

    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from_wire(s)
    }

    fn origins(entries: &[&str]) -> AllowedOrigins {
        entries.iter().map(|e| AllowedOrigin::from(*e)).collect()
    }

    fn pair(lo: &str, hi: &str) -> (Session<LoopbackPort>, Session<LoopbackPort>) {
        let (port_a, port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid(lo));
        let messenger_b = Messenger::new(port_b, origins(&["https://a.example"]), pid(hi));
        let session_a = Session::new(
            messenger_a,
            pid(lo),
            None,
            Rc::new(NativeClock),
            Some(Duration::from_secs(5)),
        );
        let session_b = Session::new(
            messenger_b,
            pid(hi),
            None,
            Rc::new(NativeClock),
            Some(Duration::from_secs(5)),
        );
        (session_a, session_b)
    }

    #[test]
    fn handshake_establishes_both_sides_with_the_greater_id_as_leader() {
        // "aaaa" < "zzzz" lexicographically, so session_b (id "zzzz") leads.
        let (session_a, session_b) = pair("aaaa", "zzzz");

        let proxy_a = futures_executor::block_on(session_a.establish(Duration::from_secs(5)));
        let proxy_b = futures_executor::block_on(session_b.establish(Duration::from_secs(5)));

        assert!(proxy_a.is_ok());
        assert!(proxy_b.is_ok());
        assert_eq!(session_a.state(), SessionState::Established);
        assert_eq!(session_b.state(), SessionState::Established);
    }

    #[test]
    fn established_session_carries_calls_end_to_end() {
        let table = MethodTable::default();
        table.register(&["echo"], |args| Ok(args[0].clone()));

        let (port_a, port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("aaaa"));
        let messenger_b = Messenger::new(port_b, origins(&["https://a.example"]), pid("zzzz"));
        let session_a = Session::new(
            messenger_a,
            pid("aaaa"),
            None,
            Rc::new(NativeClock),
            Some(Duration::from_secs(5)),
        );
        let session_b = Session::new(
            messenger_b,
            pid("zzzz"),
            Some(table),
            Rc::new(NativeClock),
            Some(Duration::from_secs(5)),
        );

        let proxy_a = futures_executor::block_on(session_a.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");
        futures_executor::block_on(session_b.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");

        let result = futures_executor::block_on(proxy_a.call(&["echo"], vec![json!("hi")]));
        assert_eq!(result, Ok(json!("hi")));
    }

    #[test]
    fn handshake_times_out_with_no_peer() {
        let (port_a, _port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("aaaa"));
        let session_a = Session::new(
            messenger_a,
            pid("aaaa"),
            None,
            Rc::new(NativeClock),
            None,
        );

        let result = futures_executor::block_on(session_a.establish(Duration::from_millis(30)));
        assert!(matches!(result, Err(SessionError::HandshakeTimeout { .. })));
        assert_eq!(session_a.state(), SessionState::Failed);
    }

    #[test]
    fn destroy_rejects_pending_calls_and_is_idempotent() {
        use futures_executor::LocalPool;
        use futures_util::task::LocalSpawnExt;

        let (session_a, session_b) = pair("aaaa", "zzzz");
        let proxy_a = futures_executor::block_on(session_a.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");
        futures_executor::block_on(session_b.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");

        let mut pool = LocalPool::new();
        let result: Rc<RefCell<Option<Result<Value, RpcError>>>> = Rc::default();
        let result_clone = Rc::clone(&result);
        pool.spawner()
            .spawn_local(async move {
                let r = proxy_a.call(&["never_replies"], vec![]).await;
                *result_clone.borrow_mut() = Some(r);
            })
            .expect("spawn succeeds");

        // session_b never replies, so this drives the call to registered and
        // sent, then stalls awaiting a REPLY that will never arrive.
        pool.run_until_stalled();
        assert!(result.borrow().is_none());

        session_a.destroy();
        session_a.destroy(); // idempotent

        pool.run_until_stalled();
        assert_eq!(*result.borrow(), Some(Err(RpcError::Destroyed)));
        assert_eq!(session_a.state(), SessionState::Destroyed);
    }

    #[test]
    fn destroy_from_peer_tears_down_the_local_session() {
        let (session_a, session_b) = pair("aaaa", "zzzz");
        futures_executor::block_on(session_a.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");
        futures_executor::block_on(session_b.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");

        session_b.destroy();
        assert_eq!(session_a.state(), SessionState::Destroyed);
    }

    #[test]
    fn on_destroyed_fires_once_whether_teardown_is_local_or_peer_initiated() {
        let (session_a, session_b) = pair("aaaa", "zzzz");
        futures_executor::block_on(session_a.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");
        futures_executor::block_on(session_b.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");

        let fires = Rc::new(Cell::new(0u32));
        let fires_clone = Rc::clone(&fires);
        session_a.on_destroyed(move || fires_clone.set(fires_clone.get() + 1));

        session_b.destroy();
        assert_eq!(fires.get(), 1);

        session_a.destroy(); // idempotent; must not fire a second time
        assert_eq!(fires.get(), 1);
    }

    #[test]
    fn concurrent_establish_callers_all_observe_the_same_successful_handshake() {
        use futures_executor::LocalPool;
        use futures_util::task::LocalSpawnExt;

        let (session_a, session_b) = pair("aaaa", "zzzz");

        let mut pool = LocalPool::new();
        let first: Rc<RefCell<Option<Result<(), SessionError>>>> = Rc::default();
        let second: Rc<RefCell<Option<Result<(), SessionError>>>> = Rc::default();

        let session_a_first = session_a.clone();
        let first_clone = Rc::clone(&first);
        pool.spawner()
            .spawn_local(async move {
                let r = session_a_first.establish(Duration::from_secs(5)).await;
                *first_clone.borrow_mut() = Some(r.map(|_| ()));
            })
            .expect("spawn succeeds");

        // A second, independent waiter registered before the handshake
        // completes must not have its sender overwritten by the first.
        let session_a_second = session_a.clone();
        let second_clone = Rc::clone(&second);
        pool.spawner()
            .spawn_local(async move {
                let r = session_a_second.establish(Duration::from_secs(5)).await;
                *second_clone.borrow_mut() = Some(r.map(|_| ()));
            })
            .expect("spawn succeeds");

        futures_executor::block_on(session_b.establish(Duration::from_secs(5)))
            .expect("handshake succeeds");
        pool.run_until_stalled();

        assert_eq!(*first.borrow(), Some(Ok(())));
        assert_eq!(*second.borrow(), Some(Ok(())));
    }

    #[test]
    fn unaddressed_ack1_is_ignored() {
        // An ACK1 addressed to a third party must not advance our state.
        let (port_a, port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("aaaa"));
        let messenger_b = Messenger::new(port_b, origins(&["https://a.example"]), pid("zzzz"));
        let session_a = Session::new(
            messenger_a,
            pid("aaaa"),
            None,
            Rc::new(NativeClock),
            None,
        );

        messenger_b.send_message(&Envelope::new(pid("zzzz"), MessageType::Syn), None);
        assert_eq!(session_a.state(), SessionState::Paired);

        let misaddressed = Envelope::new(
            pid("zzzz"),
            MessageType::Ack1 {
                to_participant_id: pid("someone-else"),
            },
        );
        messenger_b.send_message(&misaddressed, None);
        assert_eq!(session_a.state(), SessionState::Paired);
    }
}
