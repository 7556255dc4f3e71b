//! Incoming-call dispatch: resolves a dotted `method_path` to a registered
//! handler and replies with its result.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use xframe_bridge_proto::ProtoError;

/// A handler for one locally-exposed method.
///
/// Boxed as `dyn Fn` rather than `FnMut` since a single method may be
/// invoked concurrently by several in-flight calls before any of them
/// resolves (the single-threaded reentrancy model lets a handler's own
/// outgoing call interleave with another inbound `CALL`).
pub trait MethodHandler: Fn(Vec<Value>) -> Result<Value, String> {}
impl<T: Fn(Vec<Value>) -> Result<Value, String>> MethodHandler for T {}

/// A flat registry of dotted method paths to handlers.
///
/// Callers on the other side of the bridge see this as nested object
/// properties; this crate has no property-proxy idiom to mirror that with,
/// so the tree is flattened at registration time into
/// `"a.b.c"`-joined keys instead of walking a path vector at dispatch time.
#[derive(Clone, Default)]
pub struct MethodTable {
    handlers: Rc<RefCell<HashMap<String, Box<dyn MethodHandler>>>>,
}

impl MethodTable {
    /// Registers `handler` at `method_path`. A later registration at the
    /// same path replaces the earlier one.
    pub fn register(&self, method_path: &[&str], handler: impl MethodHandler + 'static) {
        self.handlers
            .borrow_mut()
            .insert(method_path.join("."), Box::new(handler));
    }

    /// Invokes the handler registered at `method_path`, if any.
    ///
    /// Distinguishes a missing handler ([`ProtoError::MethodNotFound`]) from
    /// a registered handler's own `Err` ([`ProtoError::MethodThrew`], which
    /// carries the handler's message unmodified) so a reply's `value` never
    /// conflates the two.
    pub fn invoke(&self, method_path: &[String], args: Vec<Value>) -> Result<Value, ProtoError> {
        let key = method_path.join(".");
        let handlers = self.handlers.borrow();
        let handler = handlers
            .get(&key)
            .ok_or_else(|| ProtoError::MethodNotFound(key.clone()))?;
        handler(args).map_err(ProtoError::MethodThrew)
    }
}
