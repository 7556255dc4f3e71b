//! The four-state value a connection cell holds.

/// A slot that is either empty, pending, or settled.
///
/// Mirrors the shape a reactive UI layer expects from an async resource:
/// nothing requested yet, a request in flight, or a result (success or
/// failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loadable<T, E> {
    /// No promise has ever occupied the slot.
    Uninitialized,
    /// A promise occupies the slot and has not yet settled.
    Loading,
    /// The promise fulfilled with `T`.
    HasData(T),
    /// The promise rejected with `E`.
    HasError(E),
}

impl<T, E> Loadable<T, E> {
    /// Whether the slot has never held a promise.
    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Loadable::Uninitialized)
    }

    /// Whether a promise is currently pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    /// The settled value, if the slot has data.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Loadable::HasData(value) => Some(value),
            _ => None,
        }
    }

    /// The settled error, if the slot has an error.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match self {
            Loadable::HasError(error) => Some(error),
            _ => None,
        }
    }

    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            Loadable::Uninitialized => "uninitialized",
            Loadable::Loading => "loading",
            Loadable::HasData(_) => "hasData",
            Loadable::HasError(_) => "hasError",
        }
    }
}
