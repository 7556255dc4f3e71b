//! The JavaScript-facing API: a `#[wasm_bindgen]` wrapper around
//! [`crate::Bridge`] that resolves `connect()`'s default target to
//! `window.parent` the way a browser embed actually would.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::Window;
use xframe_bridge_messenger::{AllowedOrigin, AllowedOrigins, WindowPort};
use xframe_bridge_rpc::{Clock, WasmClock};

use crate::bridge::{Bridge, PeerKey};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::spawn::{Spawn, WasmSpawner};

thread_local! {
    // `Window` has no `Hash`/`Eq` impl; identity is tracked by reference
    // equality (`js_sys::Object::is`, JS `SameValueZero`) against a flat
    // list instead. Small and rarely grows beyond a handful of distinct
    // peer windows per page.
    static KNOWN_WINDOWS: RefCell<Vec<(Window, PeerKey)>> = const { RefCell::new(Vec::new()) };
    static NEXT_PEER_KEY: Cell<PeerKey> = const { Cell::new(0) };
}

fn peer_key_for(window: &Window) -> PeerKey {
    KNOWN_WINDOWS.with(|known| {
        let mut known = known.borrow_mut();
        if let Some((_, key)) = known
            .iter()
            .find(|(w, _)| js_sys::Object::is(w.as_ref(), window.as_ref()))
        {
            return *key;
        }
        let key = NEXT_PEER_KEY.with(|next| {
            let key = next.get();
            next.set(key + 1);
            key
        });
        known.push((window.clone(), key));
        key
    })
}

/// The cross-frame RPC bridge, exported to JavaScript.
///
/// One `XframeBridge` is meant to live for the lifetime of the component
/// that owns it; `connect`/`reset`/`destroy` manage the underlying session,
/// and `remoteProxyPromise`/`isConnected` observe it.
#[wasm_bindgen]
pub struct XframeBridge {
    inner: Bridge<WindowPort>,
    own_window: Window,
}

#[wasm_bindgen]
impl XframeBridge {
    /// Builds a bridge accepting traffic only from `allowed_origins`
    /// (exact strings, or `"*"` for wildcard).
    ///
    /// # Errors
    ///
    /// Returns an error if there is no global `window` (this API is
    /// meaningless outside a browser window context, e.g. in a worker).
    #[wasm_bindgen(constructor)]
    pub fn new(allowed_origins: Vec<String>) -> Result<XframeBridge, JsError> {
        console_error_panic_hook::set_once();
        let own_window =
            web_sys::window().ok_or_else(|| JsError::new("no global `window` available"))?;
        let origins: AllowedOrigins = allowed_origins
            .into_iter()
            .map(AllowedOrigin::from)
            .collect();
        let config = BridgeConfig::new(origins);
        let clock: Rc<dyn Clock> = Rc::new(WasmClock::default());
        let spawner: Rc<dyn Spawn> = Rc::new(WasmSpawner);
        Ok(Self {
            inner: Bridge::new(config, clock, spawner),
            own_window,
        })
    }

    /// Binds to `target`, or to `window.parent` if `target` is omitted.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoTarget`] (as its string form) if no
    /// explicit target was given and this window has no distinct parent
    /// (e.g. it is the top-level window).
    pub fn connect(&self, target: Option<Window>) -> Result<(), JsError> {
        let target = match target {
            Some(window) => window,
            None => self
                .own_window
                .parent()
                .map_err(|e| JsError::new(&format!("{e:?}")))?
                .filter(|parent| !js_sys::Object::is(parent.as_ref(), self.own_window.as_ref()))
                .ok_or_else(|| JsError::new(&BridgeError::NoTarget.to_string()))?,
        };
        let peer_key = peer_key_for(&target);
        let own_window = self.own_window.clone();
        self.inner
            .connect(peer_key, move || WindowPort::new(own_window.clone(), target.clone()));
        Ok(())
    }

    /// Tears down the current session and, if a peer is bound, starts a
    /// fresh handshake against it.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Tears down the current session and forgets the bound peer.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Whether the remote proxy is currently available.
    #[wasm_bindgen(js_name = isConnected)]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Awaits the handshake and invokes `method_path.join(".")` on the
    /// peer, resolving to its reply value or rejecting with the call's
    /// error.
    pub fn call(&self, method_path: Vec<String>, args: JsValue) -> js_sys::Promise {
        let inner = self.inner.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            let args: Vec<serde_json::Value> = serde_wasm_bindgen::from_value(args)
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            let proxy = inner
                .remote_proxy()
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            let path: Vec<&str> = method_path.iter().map(String::as_str).collect();
            let result = proxy
                .call(&path, args)
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            serde_wasm_bindgen::to_value(&result).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }
}
