//! The abstract message port and its implementations.

use serde_json::Value;

use crate::error::PortError;

/// A window-like message port: something that can post a structured-clone
/// value to a peer with a target-origin check, and that delivers inbound
/// messages (each tagged with the sender's origin) to a single registered
/// listener.
///
/// Implementations are not required to be `Send`/`Sync` — the distilled
/// concurrency model is single-threaded cooperative, matching a
/// browser's event loop.
pub trait MessagePort {
    /// Sends `value` to the peer, restricting delivery to `target_origin`
    /// (or `"*"` for no restriction).
    ///
    /// # Errors
    ///
    /// Returns [`PortError::SendFailed`] if the underlying transport rejects
    /// the send.
    fn post_message(&self, value: &Value, target_origin: &str) -> Result<(), PortError>;

    /// Registers the single inbound listener, replacing any previous one.
    /// The listener receives `(origin, data)` for every inbound message
    /// event, unfiltered — origin/self/recognition filtering is the
    /// [`crate::Messenger`]'s job, not the port's.
    fn start_listening(&self, on_message: Box<dyn Fn(&str, &Value)>);

    /// Unregisters the inbound listener, if any.
    fn stop_listening(&self);
}

#[cfg(not(target_arch = "wasm32"))]
mod loopback {
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    use serde_json::Value;

    use super::MessagePort;
    use crate::error::PortError;

    struct Endpoint {
        origin: String,
        // `Rc` rather than `Box` so `post_message` can clone the listener
        // out and drop the borrow before invoking it. Otherwise a listener
        // that reacts to a message by calling `stop_listening()` on its own
        // port (exactly what tearing down a session on receipt of `DESTROY`
        // does) would re-enter this same `RefCell` while `post_message`
        // still held its borrow, and panic.
        listener: RefCell<Option<Rc<dyn Fn(&str, &Value)>>>,
    }

    /// An in-process message port with no real window underneath it, used by
    /// native unit/integration tests and by anything exercising the bridge
    /// off the browser. `post_message` delivers synchronously and
    /// reentrantly, exactly mirroring how a same-process test harness (or a
    /// browser delivering a message during a microtask) can invoke the
    /// listener before `post_message` itself returns.
    pub struct LoopbackPort {
        local: Rc<Endpoint>,
        peer: Weak<Endpoint>,
    }

    impl LoopbackPort {
        /// Builds two ports, each the other's peer, with the given origins.
        #[must_use]
        pub fn pair(origin_a: impl Into<String>, origin_b: impl Into<String>) -> (Self, Self) {
            let a = Rc::new(Endpoint {
                origin: origin_a.into(),
                listener: RefCell::new(None),
            });
            let b = Rc::new(Endpoint {
                origin: origin_b.into(),
                listener: RefCell::new(None),
            });
            let port_a = LoopbackPort {
                local: Rc::clone(&a),
                peer: Rc::downgrade(&b),
            };
            let port_b = LoopbackPort {
                local: b,
                peer: Rc::downgrade(&a),
            };
            (port_a, port_b)
        }
    }

    impl MessagePort for LoopbackPort {
        fn post_message(&self, value: &Value, _target_origin: &str) -> Result<(), PortError> {
            let Some(peer) = self.peer.upgrade() else {
                return Err(PortError::SendFailed("peer port closed".into()));
            };
            // Clone the `Rc` and drop the borrow before calling the listener:
            // the listener may reentrantly call `stop_listening()` on this
            // same endpoint (tearing itself down on receipt of the message),
            // which would otherwise conflict with this borrow.
            let listener = peer.listener.borrow().clone();
            if let Some(listener) = listener {
                listener(&self.local.origin, value);
            }
            Ok(())
        }

        fn start_listening(&self, on_message: Box<dyn Fn(&str, &Value)>) {
            *self.local.listener.borrow_mut() = Some(Rc::from(on_message));
        }

        fn stop_listening(&self) {
            *self.local.listener.borrow_mut() = None;
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use loopback::LoopbackPort;

#[cfg(target_arch = "wasm32")]
mod window {
    use std::cell::RefCell;

    use serde_json::Value;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;
    use web_sys::{MessageEvent, Window};

    use super::MessagePort;
    use crate::error::PortError;

    /// A real `window.postMessage` port: `peer` is the target window to post
    /// to, `local` is the window whose `"message"` events are observed.
    pub struct WindowPort {
        local: Window,
        peer: Window,
        closure: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
    }

    impl WindowPort {
        /// Builds a port that posts to `peer` and listens on `local`.
        #[must_use]
        pub fn new(local: Window, peer: Window) -> Self {
            Self {
                local,
                peer,
                closure: RefCell::new(None),
            }
        }
    }

    impl MessagePort for WindowPort {
        fn post_message(&self, value: &Value, target_origin: &str) -> Result<(), PortError> {
            let js_value = serde_wasm_bindgen::to_value(value)
                .map_err(|e| PortError::SendFailed(e.to_string()))?;
            self.peer
                .post_message(&js_value, target_origin)
                .map_err(|e| PortError::SendFailed(format!("{e:?}")))
        }

        fn start_listening(&self, on_message: Box<dyn Fn(&str, &Value)>) {
            self.stop_listening();
            let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
                let origin = event.origin();
                let Ok(value) = serde_wasm_bindgen::from_value::<Value>(event.data()) else {
                    return;
                };
                on_message(&origin, &value);
            }) as Box<dyn FnMut(MessageEvent)>);
            let _ = self
                .local
                .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
            *self.closure.borrow_mut() = Some(closure);
        }

        fn stop_listening(&self) {
            if let Some(closure) = self.closure.borrow_mut().take() {
                let _ = self.local.remove_event_listener_with_callback(
                    "message",
                    closure.as_ref().unchecked_ref(),
                );
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use window::WindowPort;
