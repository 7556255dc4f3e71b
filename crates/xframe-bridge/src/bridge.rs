//! The lifecycle facade binding a [`Session`] to a peer port and publishing
//! its proxy through an observable cell.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, info};
use xframe_bridge_messenger::{Messenger, MessagePort};
use xframe_bridge_observable::ObservableCell;
use xframe_bridge_proto::ParticipantId;
use xframe_bridge_rpc::{Clock, RemoteProxy};
use xframe_bridge_session::{Session, SessionState};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::spawn::Spawn;

/// An opaque identity for the peer a [`Bridge`] is bound to, used for the
/// idempotence check in [`Bridge::connect`] and as the key in the
/// process-wide registry. On the `wasm32` facade this is derived from the
/// peer `Window`'s identity; native callers mint their own.
pub type PeerKey = u64;

type PortFactory<P> = Rc<dyn Fn() -> P>;

struct State<P: MessagePort> {
    session: Option<Session<P>>,
    peer_key: Option<PeerKey>,
    port_factory: Option<PortFactory<P>>,
}

struct Inner<P: MessagePort> {
    config: BridgeConfig,
    own_participant_id: ParticipantId,
    clock: Rc<dyn Clock>,
    spawner: Rc<dyn Spawn>,
    state: RefCell<State<P>>,
    proxy_cell: ObservableCell<Rc<RemoteProxy<P>>, BridgeError>,
}

fn registry<P: MessagePort + 'static>(
) -> &'static std::thread::LocalKey<RefCell<HashMap<PeerKey, Weak<Inner<P>>>>> {
    // `thread_local!` inside a generic function is monomorphized along with
    // it, so each port type `P` gets its own distinct map rather than
    // sharing one keyed by an erased type.
    thread_local! {
        static REGISTRY: RefCell<HashMap<PeerKey, Weak<Inner<P>>>> = RefCell::new(HashMap::new());
    }
    &REGISTRY
}

/// Binds one peer window-like port to a live [`Session`] and keeps a
/// reactive cell tracking the resulting RPC proxy.
///
/// Cloning shares state (an `Rc` internally).
pub struct Bridge<P: MessagePort + 'static> {
    inner: Rc<Inner<P>>,
}

impl<P: MessagePort + 'static> Clone for Bridge<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: MessagePort + 'static> Bridge<P> {
    /// Constructs a bridge with no session bound (`uninitialized`).
    #[must_use]
    pub fn new(config: BridgeConfig, clock: Rc<dyn Clock>, spawner: Rc<dyn Spawn>) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                own_participant_id: ParticipantId::generate(),
                clock,
                spawner,
                state: RefCell::new(State {
                    session: None,
                    peer_key: None,
                    port_factory: None,
                }),
                proxy_cell: ObservableCell::new(),
            }),
        }
    }

    /// Binds to a peer, constructing its port via `make_port`.
    ///
    /// Idempotent for the same `peer_key` with a still-live session. For a
    /// different peer, or when no session is live, tears down any current
    /// session and starts a new one. `make_port` is retained so [`reset`]
    /// can rebuild the port for a fresh handshake against the same peer.
    ///
    /// [`reset`]: Bridge::reset
    pub fn connect(&self, peer_key: PeerKey, make_port: impl Fn() -> P + 'static) {
        let previous_peer_key = {
            let state = self.inner.state.borrow();
            if state.peer_key == Some(peer_key) && session_is_live(state.session.as_ref()) {
                return;
            }
            state.peer_key
        };
        self.teardown_current_session();
        let factory: PortFactory<P> = Rc::new(make_port);
        {
            let mut state = self.inner.state.borrow_mut();
            state.peer_key = Some(peer_key);
            state.port_factory = Some(Rc::clone(&factory));
        }
        if let Some(previous_peer_key) = previous_peer_key {
            if previous_peer_key != peer_key {
                self.unregister(previous_peer_key);
            }
        }
        self.register(peer_key);
        self.start_session(factory());
    }

    /// Destroys the current session and, if a peer is bound, immediately
    /// starts a fresh one against it.
    pub fn reset(&self) {
        let factory = self.inner.state.borrow().port_factory.clone();
        self.teardown_current_session();
        if let Some(factory) = factory {
            self.start_session(factory());
        }
    }

    /// Tears down the current session (if any) and forgets the bound peer,
    /// returning the bridge to `uninitialized`.
    pub fn destroy(&self) {
        let peer_key = self.inner.state.borrow().peer_key;
        self.teardown_current_session();
        let mut state = self.inner.state.borrow_mut();
        state.peer_key = None;
        state.port_factory = None;
        drop(state);
        if let Some(peer_key) = peer_key {
            self.unregister(peer_key);
        }
    }

    /// Whether the observable cell currently holds data (the proxy is
    /// live).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.proxy_cell.get().data().is_some()
    }

    /// Awaits the current session's proxy, or fails with
    /// [`BridgeError::NoSession`] if nothing has ever been bound.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoSession`] if `connect` was never called, or
    /// the handshake's own error if it fails or times out.
    pub async fn remote_proxy(&self) -> Result<Rc<RemoteProxy<P>>, BridgeError> {
        let session = self
            .inner
            .state
            .borrow()
            .session
            .clone()
            .ok_or(BridgeError::NoSession)?;
        session
            .establish(self.inner.config.handshake_timeout)
            .await
            .map_err(BridgeError::from)
    }

    /// The observable cell tracking the proxy's loadable state, for
    /// reactive consumers.
    #[must_use]
    pub fn remote_proxy_observable(&self) -> ObservableCell<Rc<RemoteProxy<P>>, BridgeError> {
        self.inner.proxy_cell.clone()
    }

    fn teardown_current_session(&self) {
        let previous = self.inner.state.borrow_mut().session.take();
        if let Some(session) = previous {
            session.destroy();
            info!("session destroyed");
        }
        self.inner.proxy_cell.set_uninitialized();
    }

    fn start_session(&self, port: P) {
        let messenger = Messenger::new(
            port,
            self.inner.config.allowed_origins.clone(),
            self.inner.own_participant_id.clone(),
        );
        let session = Session::new(
            messenger,
            self.inner.own_participant_id.clone(),
            Some(self.inner.config.methods.clone()),
            Rc::clone(&self.inner.clock),
            self.inner.config.call_timeout,
        );
        self.inner.state.borrow_mut().session = Some(session.clone());
        self.inner.proxy_cell.set_loading();
        debug!("session created");

        // Keeps the cell consistent with a teardown this bridge did not
        // itself initiate (the peer's own `DESTROY`), per the peer-observes
        // the reset-cycle scenario: the non-resetting side's cell must fall
        // back to `uninitialized` too.
        let on_destroy_cell = self.inner.proxy_cell.clone();
        session.on_destroyed(move || on_destroy_cell.set_uninitialized());

        let cell = self.inner.proxy_cell.clone();
        let handshake_timeout = self.inner.config.handshake_timeout;
        self.inner.spawner.spawn_local(Box::pin(async move {
            let result = session
                .establish(handshake_timeout)
                .await
                .map_err(BridgeError::from);
            cell.resolve(result);
        }));
    }

    fn register(&self, peer_key: PeerKey) {
        registry::<P>().with(|reg| {
            let previous = reg
                .borrow_mut()
                .insert(peer_key, Rc::downgrade(&self.inner));
            if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
                if !Rc::ptr_eq(&previous, &self.inner) {
                    destroy_occupant(&previous);
                }
            }
        });
    }

    fn unregister(&self, peer_key: PeerKey) {
        registry::<P>().with(|reg| {
            let mut reg = reg.borrow_mut();
            if let Some(weak) = reg.get(&peer_key) {
                if let Some(occupant) = weak.upgrade() {
                    if Rc::ptr_eq(&occupant, &self.inner) {
                        reg.remove(&peer_key);
                    }
                }
            }
        });
    }
}

fn session_is_live<P: MessagePort>(session: Option<&Session<P>>) -> bool {
    matches!(
        session.map(Session::state),
        Some(
            SessionState::Initiating
                | SessionState::Paired
                | SessionState::EstablishingFollower
                | SessionState::Established
        )
    )
}

fn destroy_occupant<P: MessagePort + 'static>(inner: &Rc<Inner<P>>) {
    if let Some(session) = inner.state.borrow_mut().session.take() {
        session.destroy();
    }
    inner.proxy_cell.set_uninitialized();
}
