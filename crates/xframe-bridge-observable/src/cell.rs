//! The subscribable container holding a [`Loadable`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::loadable::Loadable;

/// A token returned by [`ObservableCell::subscribe`], passed to
/// [`ObservableCell::unsubscribe`] to remove that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct State<T, E> {
    value: RefCell<Loadable<T, E>>,
    // `Rc` rather than `Box` so notification can clone the list and drop the
    // borrow before invoking any listener, the same reentrancy-safety
    // pattern `Messenger`'s handler fan-out uses: a listener reacting to
    // `hasError` by calling `set_loading` (re-initiating a connection) must
    // not conflict with the borrow the notify loop holds.
    subscribers: RefCell<Vec<(u64, Rc<dyn Fn(&Loadable<T, E>)>)>>,
    next_id: Cell<u64>,
}

/// A reactive cell holding a [`Loadable`], with a minimal subscriber list.
///
/// Cloning shares state (an `Rc` internally), matching the cloning contract
/// of `Messenger` and `Session` elsewhere in this workspace.
pub struct ObservableCell<T, E> {
    state: Rc<State<T, E>>,
}

impl<T, E> Clone for ObservableCell<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T, E> Default for ObservableCell<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> ObservableCell<T, E> {
    /// Constructs a cell in the `uninitialized` state with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(State {
                value: RefCell::new(Loadable::Uninitialized),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Registers `listener`, invoked with the current value immediately and
    /// again on every subsequent transition, until unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&Loadable<T, E>) + 'static) -> SubscriptionId {
        let id = self.state.next_id.get();
        self.state.next_id.set(id + 1);
        let listener: Rc<dyn Fn(&Loadable<T, E>)> = Rc::new(listener);
        listener(&self.state.value.borrow());
        self.state.subscribers.borrow_mut().push((id, listener));
        SubscriptionId(id)
    }

    /// Removes a previously registered listener. A no-op if already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.state
            .subscribers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id.0);
    }

    fn notify(&self) {
        let subscribers = self.state.subscribers.borrow().clone();
        let value = self.state.value.borrow();
        for (_, listener) in &subscribers {
            listener(&value);
        }
    }

    fn set(&self, value: Loadable<T, E>) {
        debug!(to = value.variant_name(), "observable cell transition");
        *self.state.value.borrow_mut() = value;
        self.notify();
    }

    /// Empties the slot: no promise is currently bound.
    pub fn set_uninitialized(&self) {
        self.set(Loadable::Uninitialized);
    }

    /// Replaces the slot with a pending promise. Observers see `loading`
    /// immediately, even if the previous state was `hasData` or `hasError`.
    pub fn set_loading(&self) {
        self.set(Loadable::Loading);
    }

    /// Settles the slot with `result`, transitioning to `hasData` or
    /// `hasError`. The result is memoized: repeated reads return the same
    /// value without recomputation until the slot is replaced again.
    pub fn resolve(&self, result: Result<T, E>) {
        self.set(match result {
            Ok(value) => Loadable::HasData(value),
            Err(error) => Loadable::HasError(error),
        });
    }
}

impl<T: Clone, E: Clone> ObservableCell<T, E> {
    /// A clone of the current value.
    #[must_use]
    pub fn get(&self) -> Loadable<T, E> {
        self.state.value.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn starts_uninitialized() {
        let cell: ObservableCell<i32, String> = ObservableCell::new();
        assert!(cell.get().is_uninitialized());
    }

    #[test]
    fn loading_then_has_data_transitions_are_observed() {
        let cell: ObservableCell<i32, String> = ObservableCell::new();
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let seen_clone = Rc::clone(&seen);
        cell.subscribe(move |loadable| {
            seen_clone.borrow_mut().push(loadable.variant_name().to_owned());
        });

        cell.set_loading();
        cell.resolve(Ok(42));

        assert_eq!(
            seen.borrow().as_slice(),
            ["uninitialized", "loading", "hasData"]
        );
        assert_eq!(cell.get().data(), Some(&42));
    }

    #[test]
    fn replacing_the_slot_transitions_to_loading_even_from_has_data() {
        let cell: ObservableCell<i32, String> = ObservableCell::new();
        cell.set_loading();
        cell.resolve(Ok(1));
        assert_eq!(cell.get().data(), Some(&1));

        cell.set_loading();
        assert!(cell.get().is_loading());
    }

    #[test]
    fn error_resolution_sets_has_error() {
        let cell: ObservableCell<i32, String> = ObservableCell::new();
        cell.set_loading();
        cell.resolve(Err("boom".to_owned()));
        assert_eq!(cell.get().error(), Some(&"boom".to_owned()));
    }

    #[test]
    fn unsubscribed_listener_stops_receiving_updates() {
        let cell: ObservableCell<i32, String> = ObservableCell::new();
        let count: Rc<RefCell<u32>> = Rc::default();
        let count_clone = Rc::clone(&count);
        let id = cell.subscribe(move |_| *count_clone.borrow_mut() += 1);

        cell.set_loading();
        cell.unsubscribe(id);
        cell.resolve(Ok(1));

        // One call at subscribe time, one for `set_loading`; the `resolve`
        // after unsubscribing must not be observed.
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn listener_reacting_by_replacing_the_slot_is_safe() {
        // A listener that reacts to `hasError` by re-initiating (calling
        // `set_loading` reentrantly) must not panic via a borrow conflict.
        let cell: ObservableCell<i32, String> = ObservableCell::new();
        let cell_clone = cell.clone();
        let reinitiated = Rc::new(RefCell::new(false));
        let reinitiated_clone = Rc::clone(&reinitiated);
        cell.subscribe(move |loadable| {
            if loadable.error().is_some() && !*reinitiated_clone.borrow() {
                *reinitiated_clone.borrow_mut() = true;
                cell_clone.set_loading();
            }
        });

        cell.set_loading();
        cell.resolve(Err("boom".to_owned()));

        assert!(cell.get().is_loading());
    }
}
