//! The outgoing call proxy.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use rand::RngCore;
use serde_json::Value;
use xframe_bridge_messenger::{Messenger, PortError};
use xframe_bridge_proto::{Envelope, MessageType, ParticipantId};

use crate::clock::Clock;
use crate::error::RpcError;
use crate::pending::PendingCalls;

/// The outgoing half of an established RPC channel.
///
/// Rust has no dynamic property interception, so unlike the source
/// protocol's JavaScript `Proxy`-based client, invocation is the explicit
/// `call(method_path, args)` entry point, the natural equivalent for
/// languages without that idiom. The
/// "accessed but not called" guard from the same section is a
/// property-interception UX refinement with no Rust analogue and is
/// intentionally not reproduced.
pub struct RemoteProxy<P: xframe_bridge_messenger::MessagePort> {
    messenger: Messenger<P>,
    own_participant_id: ParticipantId,
    pending: PendingCalls,
    clock: Rc<dyn Clock>,
    call_timeout: Option<Duration>,
    destroyed: Rc<Cell<bool>>,
}

impl<P: xframe_bridge_messenger::MessagePort + 'static> RemoteProxy<P> {
    /// Constructs a proxy over an established messenger.
    #[must_use]
    pub fn new(
        messenger: Messenger<P>,
        own_participant_id: ParticipantId,
        pending: PendingCalls,
        clock: Rc<dyn Clock>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            messenger,
            own_participant_id,
            pending,
            clock,
            call_timeout,
            destroyed: Rc::new(Cell::new(false)),
        }
    }

    /// Marks this proxy as invalidated. Every subsequent `call` rejects
    /// synchronously with [`RpcError::Destroyed`]; this does not itself
    /// reject already-pending calls — the owning session's destruction path
    /// does that via [`PendingCalls::reject_all`].
    pub fn invalidate(&self) {
        self.destroyed.set(true);
    }

    /// Invokes the peer's method at `method_path` with `args`, returning the
    /// peer's reply value or an [`RpcError`].
    pub async fn call(&self, method_path: &[&str], args: Vec<Value>) -> Result<Value, RpcError> {
        if self.destroyed.get() || self.messenger.is_destroyed() {
            return Err(RpcError::Destroyed);
        }

        let call_id = generate_call_id();
        let path_label = method_path.join(".");
        let rx = self.pending.register(call_id.clone(), path_label.clone());

        let envelope = Envelope::new(
            self.own_participant_id.clone(),
            MessageType::Call {
                id: call_id.clone(),
                method_path: method_path.iter().map(|s| (*s).to_owned()).collect(),
                args,
            },
        );

        let send_error: Rc<Cell<Option<PortError>>> = Rc::new(Cell::new(None));
        let send_error_clone = Rc::clone(&send_error);
        let ok = self
            .messenger
            .send_message(&envelope, Some(&move |e: &PortError| {
                send_error_clone.set(Some(e.clone()));
            }));
        if !ok {
            self.pending.remove(&call_id);
            let reason = send_error
                .take()
                .map_or_else(|| "unknown error".to_owned(), |e| e.to_string());
            return Err(RpcError::CallSendFailed(reason));
        }

        match self.call_timeout {
            None => rx.await.map_err(|_| RpcError::Destroyed)?,
            Some(timeout) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                futures_util::pin_mut!(rx);
                let delay = self.clock.delay(timeout);
                futures_util::pin_mut!(delay);
                match futures_util::future::select(rx, delay).await {
                    futures_util::future::Either::Left((result, _)) => {
                        result.map_err(|_| RpcError::Destroyed)?
                    }
                    futures_util::future::Either::Right(((), _)) => {
                        self.pending.remove(&call_id);
                        Err(RpcError::CallTimeout {
                            method_path: path_label,
                            timeout_ms,
                        })
                    }
                }
            }
        }
    }
}

fn generate_call_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(LUT[(b >> 4) as usize] as char);
        out.push(LUT[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use xframe_bridge_messenger::{AllowedOrigin, AllowedOrigins, LoopbackPort};

    use super::*;
    use crate::clock::NativeClock;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from_wire(s)
    }

    fn origins(entries: &[&str]) -> AllowedOrigins {
        entries.iter().map(|e| AllowedOrigin::from(*e)).collect()
    }

    #[test]
    fn call_resolves_when_a_reply_arrives() {
        let (port_a, port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("P1"));
        let messenger_b = Messenger::new(port_b, origins(&["https://a.example"]), pid("P2"));

        let pending = PendingCalls::default();
        let proxy = RemoteProxy::new(
            messenger_a,
            pid("P1"),
            pending,
            Rc::new(NativeClock),
            Some(Duration::from_secs(5)),
        );

        // Callee: reply 15 to any CALL it sees.
        messenger_b.add_handler(move |envelope| {
            if let MessageType::Call { id, .. } = &envelope.message {
                let reply = Envelope::new(
                    pid("P2"),
                    MessageType::Reply {
                        call_id: id.clone(),
                        is_error: false,
                        value: json!(15),
                    },
                );
                messenger_b.send_message(&reply, None);
            }
        });

        let result = futures_executor::block_on(proxy.call(&["subtract"], vec![json!(25), json!(10)]));
        assert_eq!(result, Ok(json!(15)));
    }

    #[test]
    fn call_rejects_on_error_reply() {
        let (port_a, port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("P1"));
        let messenger_b = Messenger::new(port_b, origins(&["https://a.example"]), pid("P2"));

        let pending = PendingCalls::default();
        let pending_clone = pending.clone();
        messenger_a.add_handler(move |envelope| {
            if let MessageType::Reply {
                call_id,
                is_error,
                value,
            } = &envelope.message
            {
                let result = if *is_error {
                    Err(RpcError::MethodThrew(value.as_str().unwrap_or_default().to_owned()))
                } else {
                    Ok(value.clone())
                };
                pending_clone.resolve(call_id, result);
            }
        });

        let proxy = RemoteProxy::new(
            messenger_a,
            pid("P1"),
            pending,
            Rc::new(NativeClock),
            Some(Duration::from_secs(5)),
        );

        messenger_b.add_handler(move |envelope| {
            if let MessageType::Call { id, .. } = &envelope.message {
                let reply = Envelope::new(
                    pid("P2"),
                    MessageType::Reply {
                        call_id: id.clone(),
                        is_error: true,
                        value: json!("multiply is not found."),
                    },
                );
                messenger_b.send_message(&reply, None);
            }
        });

        let result = futures_executor::block_on(proxy.call(&["multiply"], vec![json!(2), json!(3)]));
        assert!(matches!(result, Err(RpcError::MethodThrew(msg)) if msg.contains("not found")));
    }

    #[test]
    fn call_times_out_when_no_reply_arrives() {
        let (port_a, _port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("P1"));
        // Learn a concrete origin so the send itself succeeds and only the
        // timeout path is exercised.
        messenger_a.send_message(&Envelope::new(pid("P1"), MessageType::Syn), None);

        let pending = PendingCalls::default();
        let proxy = RemoteProxy::new(
            messenger_a,
            pid("P1"),
            pending.clone(),
            Rc::new(NativeClock),
            Some(Duration::from_millis(30)),
        );

        let result = futures_executor::block_on(proxy.call(&["ping"], vec![]));
        assert!(matches!(result, Err(RpcError::CallTimeout { .. })));
        assert!(pending.is_empty());
    }

    #[test]
    fn invalidated_proxy_rejects_synchronously() {
        let (port_a, _port_b) = LoopbackPort::pair("https://a.example", "https://b.example");
        let messenger_a = Messenger::new(port_a, origins(&["https://b.example"]), pid("P1"));
        let proxy = RemoteProxy::new(
            messenger_a,
            pid("P1"),
            PendingCalls::default(),
            Rc::new(NativeClock),
            None,
        );
        proxy.invalidate();
        let result = futures_executor::block_on(proxy.call(&["f"], vec![]));
        assert_eq!(result, Err(RpcError::Destroyed));
    }
}
