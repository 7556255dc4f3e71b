//! A minimal delay abstraction, so the pending-call timeout (and the
//! handshake timeout in `xframe-bridge-session`) work identically on
//! `wasm32` and in native tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Produces a future that resolves after a delay.
///
/// Not `Send` — this runtime is single-threaded cooperative, so no
/// implementation needs to cross a thread boundary.
pub trait Clock {
    /// Returns a future that completes after `duration` elapses.
    fn delay(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()>>>;
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use super::Clock;

    /// A [`Clock`] backed by a detached OS thread per delay, signalling
    /// completion through a oneshot channel. Adequate for native tests; a
    /// real host application embeds this core in a browser, where
    /// [`super::WasmClock`] is used instead.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NativeClock;

    impl Clock for NativeClock {
        fn delay(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()>>> {
            let (tx, rx) = futures_channel::oneshot::channel::<()>();
            std::thread::spawn(move || {
                std::thread::sleep(duration);
                let _ = tx.send(());
            });
            Box::pin(async move {
                let _ = rx.await;
            })
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeClock;

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    use super::Clock;

    /// A [`Clock`] backed by `window.setTimeout`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WasmClock;

    impl Clock for WasmClock {
        fn delay(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()>>> {
            let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
            Box::pin(async move {
                let (tx, rx) = futures_channel::oneshot::channel::<()>();
                let tx = std::cell::RefCell::new(Some(tx));
                let closure = Closure::once(Box::new(move || {
                    if let Some(tx) = tx.borrow_mut().take() {
                        let _ = tx.send(());
                    }
                }) as Box<dyn FnOnce()>);
                if let Some(window) = web_sys::window() {
                    let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                        closure.as_ref().unchecked_ref(),
                        millis,
                    );
                }
                closure.forget();
                let _ = rx.await;
            })
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm::WasmClock;
