//! The on-wire message envelope and its recognition predicate.

use serde_json::{Map, Value};

use crate::participant::ParticipantId;

/// Fixed string tag distinguishing this protocol from unrelated `postMessage`
/// traffic. Constant across all implementations claiming wire compatibility.
pub const NAMESPACE: &str = "xframe-bridge/v1";

/// A unique-per-call identifier minted by the caller. Opaque to the wire
/// protocol; this core mints them as random hex strings.
pub type CallId = String;

/// The type-specific payload of a message, carrying exactly the fields the
/// protocol assigns to each `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageType {
    /// Opener. No extra fields.
    Syn,
    /// Leader's acknowledgement of a `SYN`, addressed to the follower.
    Ack1 {
        /// The intended recipient, copied from the peer's `fromParticipantId`.
        to_participant_id: ParticipantId,
    },
    /// Follower's acknowledgement of `ACK1`, addressed to the leader.
    Ack2 {
        /// The intended recipient, copied from the peer's `fromParticipantId`.
        to_participant_id: ParticipantId,
    },
    /// Explicit teardown notice. No extra fields.
    Destroy,
    /// An outgoing RPC invocation.
    Call {
        /// Unique per call.
        id: CallId,
        /// Ordered sequence of property names forming the call target.
        method_path: Vec<String>,
        /// Arbitrary structured-cloneable (here: JSON) argument sequence.
        args: Vec<Value>,
    },
    /// The reply to a previously-sent `CALL`.
    Reply {
        /// Matches the originating `CALL.id`.
        call_id: CallId,
        /// Whether `value` is an error description rather than a result.
        is_error: bool,
        /// On success the returned value; on error a string description.
        value: Value,
    },
    /// A recognized wire `type` whose type-specific fields failed to parse
    /// (missing or wrong-shaped). Recognition itself only checks the fixed
    /// envelope fields (`namespace`, `type`, `fromParticipantId`); a
    /// consumer that cares about a given type's payload validates it and
    /// decides how to react, rather than the message being dropped before
    /// it ever reaches one.
    Malformed {
        /// The wire `type` string that was recognized.
        type_name: String,
    },
}

impl MessageType {
    /// The wire `type` string for this variant.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            MessageType::Syn => "SYN",
            MessageType::Ack1 { .. } => "ACK1",
            MessageType::Ack2 { .. } => "ACK2",
            MessageType::Destroy => "DESTROY",
            MessageType::Call { .. } => "CALL",
            MessageType::Reply { .. } => "REPLY",
            MessageType::Malformed { type_name } => type_name.as_str(),
        }
    }
}

/// A complete on-wire message: the fixed envelope fields plus a type-specific
/// body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The sender's participant identifier.
    pub from_participant_id: ParticipantId,
    /// Opaque channel tag, namespacing parallel RPC channels over the same
    /// port. Treated as pass-through; never routed on.
    pub channel: Option<String>,
    /// The type-specific body.
    pub message: MessageType,
}

impl Envelope {
    /// Builds a new envelope with no channel tag.
    #[must_use]
    pub fn new(from_participant_id: ParticipantId, message: MessageType) -> Self {
        Self {
            from_participant_id,
            channel: None,
            message,
        }
    }

    /// Sets the opaque channel tag.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Encodes this envelope to its canonical JSON wire representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("namespace".into(), Value::String(NAMESPACE.into()));
        map.insert(
            "type".into(),
            Value::String(self.message.type_name().into()),
        );
        map.insert(
            "fromParticipantId".into(),
            Value::String(self.from_participant_id.as_str().into()),
        );
        if let Some(channel) = &self.channel {
            map.insert("channel".into(), Value::String(channel.clone()));
        }
        match &self.message {
            MessageType::Syn | MessageType::Destroy | MessageType::Malformed { .. } => {}
            MessageType::Ack1 { to_participant_id } | MessageType::Ack2 { to_participant_id } => {
                map.insert(
                    "toParticipantId".into(),
                    Value::String(to_participant_id.as_str().into()),
                );
            }
            MessageType::Call {
                id,
                method_path,
                args,
            } => {
                map.insert("id".into(), Value::String(id.clone()));
                map.insert(
                    "methodPath".into(),
                    Value::Array(method_path.iter().cloned().map(Value::String).collect()),
                );
                map.insert("args".into(), Value::Array(args.clone()));
            }
            MessageType::Reply {
                call_id,
                is_error,
                value,
            } => {
                map.insert("callId".into(), Value::String(call_id.clone()));
                map.insert("isError".into(), Value::Bool(*is_error));
                map.insert("value".into(), value.clone());
            }
        }
        Value::Object(map)
    }

    /// Classifies an arbitrary inbound value as a protocol message.
    ///
    /// Per the recognition rule: a value is recognized iff it is a non-null
    /// object with a string `namespace` equal to [`NAMESPACE`], a string
    /// `type` in the known set, and a string `fromParticipantId`. Those four
    /// criteria are all this predicate checks — a value that satisfies them
    /// is always `Some`. Type-specific field validation happens downstream:
    /// a recognized type whose own fields are missing or wrong-shaped still
    /// decodes, as [`MessageType::Malformed`], so the consumer (not the
    /// transport) decides how to react to it.
    #[must_use]
    pub fn try_from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get("namespace")?.as_str()? != NAMESPACE {
            return None;
        }
        let type_name = map.get("type")?.as_str()?;
        if !matches!(type_name, "SYN" | "DESTROY" | "ACK1" | "ACK2" | "CALL" | "REPLY") {
            return None;
        }
        let from_participant_id =
            ParticipantId::from_wire(map.get("fromParticipantId")?.as_str()?.to_owned());
        let channel = map
            .get("channel")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        let message = decode_payload(type_name, map).unwrap_or_else(|| MessageType::Malformed {
            type_name: type_name.to_owned(),
        });

        Some(Self {
            from_participant_id,
            channel,
            message,
        })
    }
}

/// Decodes a recognized type's own fields. `None` means the envelope fields
/// (`namespace`/`type`/`fromParticipantId`) were fine but this type's
/// payload was not, which the caller turns into [`MessageType::Malformed`].
fn decode_payload(type_name: &str, map: &Map<String, Value>) -> Option<MessageType> {
    match type_name {
        "SYN" => Some(MessageType::Syn),
        "DESTROY" => Some(MessageType::Destroy),
        "ACK1" | "ACK2" => {
            let to_participant_id =
                ParticipantId::from_wire(map.get("toParticipantId")?.as_str()?.to_owned());
            Some(if type_name == "ACK1" {
                MessageType::Ack1 { to_participant_id }
            } else {
                MessageType::Ack2 { to_participant_id }
            })
        }
        "CALL" => {
            let id = map.get("id")?.as_str()?.to_owned();
            let method_path = map
                .get("methodPath")?
                .as_array()?
                .iter()
                .map(|v| v.as_str().map(ToOwned::to_owned))
                .collect::<Option<Vec<_>>>()?;
            let args = map.get("args")?.as_array()?.clone();
            Some(MessageType::Call {
                id,
                method_path,
                args,
            })
        }
        "REPLY" => {
            let call_id = map.get("callId")?.as_str()?.to_owned();
            let is_error = map.get("isError")?.as_bool()?;
            let value = map.get("value")?.clone();
            Some(MessageType::Reply {
                call_id,
                is_error,
                value,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from_wire(s)
    }

    #[test]
    fn round_trips_syn() {
        let env = Envelope::new(pid("zzzz"), MessageType::Syn);
        let json = env.to_json();
        let decoded = Envelope::try_from_json(&json).expect("recognized");
        assert_eq!(decoded, env);
    }

    #[test]
    fn round_trips_call_with_args() {
        let env = Envelope::new(
            pid("zzzz"),
            MessageType::Call {
                id: "c1".into(),
                method_path: vec!["math".into(), "add".into()],
                args: vec![json!(2), json!(3)],
            },
        );
        let json = env.to_json();
        let decoded = Envelope::try_from_json(&json).expect("recognized");
        assert_eq!(decoded, env);
    }

    #[test]
    fn round_trips_reply_error() {
        let env = Envelope::new(
            pid("aaaa"),
            MessageType::Reply {
                call_id: "c1".into(),
                is_error: true,
                value: json!("multiply is not found."),
            },
        );
        let json = env.to_json();
        let decoded = Envelope::try_from_json(&json).expect("recognized");
        assert_eq!(decoded, env);
    }

    #[test]
    fn preserves_channel_tag() {
        let env = Envelope::new(pid("zzzz"), MessageType::Syn).with_channel("rpc-2");
        let decoded = Envelope::try_from_json(&env.to_json()).expect("recognized");
        assert_eq!(decoded.channel.as_deref(), Some("rpc-2"));
    }

    #[test]
    fn rejects_wrong_namespace() {
        let value = json!({
            "namespace": "some-other-protocol",
            "type": "SYN",
            "fromParticipantId": "zzzz",
        });
        assert!(Envelope::try_from_json(&value).is_none());
    }

    #[test]
    fn rejects_unknown_type() {
        let value = json!({
            "namespace": NAMESPACE,
            "type": "PING",
            "fromParticipantId": "zzzz",
        });
        assert!(Envelope::try_from_json(&value).is_none());
    }

    #[test]
    fn rejects_non_object() {
        assert!(Envelope::try_from_json(&json!("not an object")).is_none());
        assert!(Envelope::try_from_json(&json!(null)).is_none());
        assert!(Envelope::try_from_json(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn rejects_missing_from_participant_id() {
        let value = json!({
            "namespace": NAMESPACE,
            "type": "SYN",
        });
        assert!(Envelope::try_from_json(&value).is_none());
    }

    #[test]
    fn ack_missing_to_participant_id_is_recognized_but_malformed() {
        // The fixed envelope fields are all present and valid, so this is
        // recognized per the four-criteria rule; the missing `toParticipantId`
        // is a type-specific validation failure left to the consumer.
        let value = json!({
            "namespace": NAMESPACE,
            "type": "ACK1",
            "fromParticipantId": "zzzz",
        });
        let decoded = Envelope::try_from_json(&value).expect("recognized");
        assert_eq!(
            decoded.message,
            MessageType::Malformed {
                type_name: "ACK1".to_owned()
            }
        );
    }

    #[test]
    fn call_missing_args_is_recognized_but_malformed() {
        let value = json!({
            "namespace": NAMESPACE,
            "type": "CALL",
            "fromParticipantId": "zzzz",
            "id": "c1",
            "methodPath": ["f"],
        });
        let decoded = Envelope::try_from_json(&value).expect("recognized");
        assert_eq!(
            decoded.message,
            MessageType::Malformed {
                type_name: "CALL".to_owned()
            }
        );
    }

    #[test]
    fn unrelated_foreign_postmessage_traffic_is_ignored() {
        // Simulates an arbitrary third-party postMessage payload sharing the
        // page with this protocol.
        let value = json!({"type": "webpack-hmr", "action": "sync"});
        assert!(Envelope::try_from_json(&value).is_none());
    }
}
