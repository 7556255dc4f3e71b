//! Bridge configuration.

use std::time::Duration;

use xframe_bridge_messenger::AllowedOrigins;
use xframe_bridge_rpc::MethodTable;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(10_000);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Recognized configuration for a [`crate::Bridge`], analogous to
/// `echo-app-core`'s `ConfigService`: a plain struct with a `Default`
/// impl and builder methods, not a dynamic config file — there is no
/// persisted state in this core.
#[derive(Clone)]
pub struct BridgeConfig {
    pub(crate) allowed_origins: AllowedOrigins,
    pub(crate) methods: MethodTable,
    pub(crate) handshake_timeout: Duration,
    pub(crate) call_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::default(),
            methods: MethodTable::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }
}

impl BridgeConfig {
    /// Builds a config accepting inbound/outbound traffic only from
    /// `allowed_origins`, with the default handshake (10s) and call (30s)
    /// timeouts.
    #[must_use]
    pub fn new(allowed_origins: AllowedOrigins) -> Self {
        Self {
            allowed_origins,
            ..Self::default()
        }
    }

    /// Sets the local method table exposed to the peer.
    #[must_use]
    pub fn with_methods(mut self, methods: MethodTable) -> Self {
        self.methods = methods;
        self
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Overrides the per-call RPC timeout. `None` disables call timeouts.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }
}
