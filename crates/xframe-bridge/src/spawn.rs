//! A minimal fire-and-forget task spawner, the `Bridge`-level counterpart
//! to `xframe-bridge-rpc::Clock`: `connect`/`reset` are synchronous from
//! the caller's perspective, so driving the handshake future to completion
//! and publishing its outcome on the observable cell needs somewhere to
//! run in the background.

use std::future::Future;
use std::pin::Pin;

/// Runs a future to completion without blocking the caller.
///
/// Not `Send` — this runtime is single-threaded cooperative, matching
/// `xframe-bridge-rpc::Clock`.
pub trait Spawn {
    /// Schedules `future` to run on the local task queue.
    fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>);
}

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::future::Future;
    use std::pin::Pin;

    use super::Spawn;

    /// A [`Spawn`] backed by `wasm-bindgen-futures`, the executor that
    /// actually drives the browser's microtask queue.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WasmSpawner;

    impl Spawn for WasmSpawner {
        fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>) {
            wasm_bindgen_futures::spawn_local(future);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm::WasmSpawner;

#[cfg(not(target_arch = "wasm32"))]
mod pool {
    use std::future::Future;
    use std::pin::Pin;

    use futures_util::task::LocalSpawnExt;

    use super::Spawn;

    /// A [`Spawn`] backed by a `futures_executor::LocalSpawner`, for native
    /// tests and any non-wasm embedder that drives its own local executor.
    #[derive(Clone)]
    pub struct PoolSpawner(futures_executor::LocalSpawner);

    impl PoolSpawner {
        /// Wraps an existing `LocalPool`'s spawner.
        #[must_use]
        pub fn new(spawner: futures_executor::LocalSpawner) -> Self {
            Self(spawner)
        }
    }

    impl Spawn for PoolSpawner {
        fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>) {
            // `spawn_local_obj` accepts a boxed, type-erased future directly;
            // a spawn failure means the pool was already dropped, which only
            // happens if the embedder tore down its executor early.
            let _ = self.0.spawn_local(async move { future.await });
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use pool::PoolSpawner;
