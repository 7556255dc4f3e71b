//! The messenger: origin policy, self-echo filtering, concrete-origin
//! learning, and inbound handler fan-out.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace, warn};
use xframe_bridge_proto::{Envelope, MessageType, ParticipantId};

use crate::error::PortError;
use crate::origin::AllowedOrigins;
use crate::port::MessagePort;

/// The wildcard outbound target, used for `SYN`/`DESTROY`: the peer's
/// origin is not yet, or no longer, guaranteed for these.
const WILDCARD_TARGET: &str = "*";

/// The opaque-origin string a sandboxed iframe reports.
const NULL_ORIGIN: &str = "null";

struct State {
    concrete_origin: RefCell<Option<String>>,
    destroyed: Cell<bool>,
    // `Rc` rather than `Box` so the dispatch loop can clone the list and
    // drop the borrow before invoking any handler — a handler reacting to a
    // `DESTROY` by calling `destroy()` (which clears this list) would
    // otherwise re-enter `borrow_mut()` while the loop still held `borrow()`.
    handlers: RefCell<Vec<Rc<dyn Fn(&Envelope)>>>,
}

/// Adapter over a peer window-like message port.
///
/// Cloning a `Messenger` is cheap and shares state (an `Rc` internally) —
/// this is what lets the port's inbound-listener closure hold a handle back
/// to the messenger without a reference cycle through the port itself.
pub struct Messenger<P: MessagePort> {
    port: Rc<P>,
    allowed_origins: AllowedOrigins,
    own_participant_id: ParticipantId,
    state: Rc<State>,
}

impl<P: MessagePort> Clone for Messenger<P> {
    fn clone(&self) -> Self {
        Self {
            port: Rc::clone(&self.port),
            allowed_origins: self.allowed_origins.clone(),
            own_participant_id: self.own_participant_id.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<P: MessagePort + 'static> Messenger<P> {
    /// Constructs a messenger over `port`, accepting inbound traffic only
    /// from `allowed_origins`, and rejecting echoes of `own_participant_id`.
    ///
    /// Registers the port's inbound listener immediately.
    #[must_use]
    pub fn new(
        port: P,
        allowed_origins: AllowedOrigins,
        own_participant_id: ParticipantId,
    ) -> Self {
        let messenger = Self {
            port: Rc::new(port),
            allowed_origins,
            own_participant_id,
            state: Rc::new(State {
                concrete_origin: RefCell::new(None),
                destroyed: Cell::new(false),
                handlers: RefCell::new(Vec::new()),
            }),
        };
        messenger.install_listener();
        messenger
    }

    fn install_listener(&self) {
        let allowed_origins = self.allowed_origins.clone();
        let own_participant_id = self.own_participant_id.clone();
        let state = Rc::clone(&self.state);

        self.port.start_listening(Box::new(move |origin, data| {
            if state.destroyed.get() {
                trace!("dropping inbound message: messenger destroyed");
                return;
            }
            if !allowed_origins.allows(origin) {
                trace!(%origin, "dropping inbound message: origin not allowed");
                return;
            }
            if state.concrete_origin.borrow().is_none() {
                debug!(%origin, "learned concrete peer origin");
                *state.concrete_origin.borrow_mut() = Some(origin.to_owned());
            }
            let Some(envelope) = Envelope::try_from_json(data) else {
                trace!("dropping inbound message: not a recognized protocol message");
                return;
            };
            if envelope.from_participant_id == own_participant_id {
                trace!("dropping inbound message: self-echo");
                return;
            }
            let handlers = state.handlers.borrow().clone();
            for handler in &handlers {
                handler(&envelope);
            }
        }));
    }

    /// Registers an additional inbound handler. All handlers are invoked,
    /// in registration order, for every message that passes filtering.
    pub fn add_handler(&self, handler: impl Fn(&Envelope) + 'static) {
        self.state.handlers.borrow_mut().push(Rc::new(handler));
    }

    /// The concrete peer origin learned from the first allowed inbound
    /// message, if any.
    #[must_use]
    pub fn concrete_origin(&self) -> Option<String> {
        self.state.concrete_origin.borrow().clone()
    }

    /// Sends `envelope` to the peer, applying the outbound origin policy.
    ///
    /// Returns `true` on success. On failure, invokes `on_error` (if given)
    /// with the error and returns `false` — this never panics or returns a
    /// `Result` — sending is fire-and-forget from the caller's perspective.
    pub fn send_message(&self, envelope: &Envelope, on_error: Option<&dyn Fn(&PortError)>) -> bool {
        match self.try_send(envelope) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to send message");
                if let Some(on_error) = on_error {
                    on_error(&err);
                }
                false
            }
        }
    }

    fn try_send(&self, envelope: &Envelope) -> Result<(), PortError> {
        if self.state.destroyed.get() {
            return Err(PortError::Destroyed);
        }
        let target = self.outbound_target(&envelope.message)?;
        self.port.post_message(&envelope.to_json(), &target)
    }

    fn outbound_target(&self, message: &MessageType) -> Result<String, PortError> {
        if matches!(message, MessageType::Syn | MessageType::Destroy) {
            return Ok(WILDCARD_TARGET.to_owned());
        }
        let concrete = self
            .state
            .concrete_origin
            .borrow()
            .clone()
            .ok_or(PortError::NoConcreteOrigin)?;
        if concrete == NULL_ORIGIN && self.allowed_origins.has_wildcard() {
            return Ok(WILDCARD_TARGET.to_owned());
        }
        Ok(concrete)
    }

    /// Reports whether `destroy` has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.get()
    }

    /// Tears the messenger down: unregisters the inbound listener, clears
    /// handlers, and causes all future sends to fail with
    /// [`PortError::Destroyed`].
    pub fn destroy(&self) {
        if self.state.destroyed.replace(true) {
            return;
        }
        self.port.stop_listening();
        self.state.handlers.borrow_mut().clear();
    }
}
