//! Participant identity.

use std::fmt;

use rand::RngCore;

/// An opaque, collision-negligible identifier for one end of a [`crate::Envelope`]
/// session.
///
/// Two independently-started peers generate their own `ParticipantId` with no
/// coordination; the identifier space (128 bits of randomness, hex-encoded)
/// makes a collision between two live peers negligible. Comparison under the
/// derived [`Ord`] (byte-wise on the hex string) is what elects the handshake
/// leader — see `xframe-bridge-session`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generates a fresh participant identifier from a cryptographically
    /// strong random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex_encode(&bytes))
    }

    /// Wraps an existing identifier string verbatim (used when decoding a
    /// peer's identifier off the wire).
    #[must_use]
    pub fn from_wire(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the identifier as a plain string, e.g. for wire encoding.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
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
    use super::*;

    #[test]
    fn generated_ids_are_32_hex_chars() {
        let id = ParticipantId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_generated_ids_do_not_collide() {
        let a = ParticipantId::generate();
        let b = ParticipantId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn ordering_is_strict_lexicographic_on_the_wire_string() {
        let lo = ParticipantId::from_wire("aaaa");
        let hi = ParticipantId::from_wire("zzzz");
        assert!(lo < hi);
        assert!(hi > lo);
    }

    #[test]
    fn display_matches_as_str() {
        let id = ParticipantId::from_wire("deadbeef");
        assert_eq!(id.to_string(), "deadbeef");
    }
}
