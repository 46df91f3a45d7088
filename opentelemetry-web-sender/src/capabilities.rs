use crate::client::{BeaconClient, HttpClient, XdrClient, XhrClient};
use std::fmt::Debug;
use std::sync::Arc;

/// Feature detection for the hosting environment.
///
/// The sender asks these questions instead of probing runtime globals, so
/// every combination can be exercised in tests.
pub trait Capabilities: Debug + Send + Sync {
    /// `navigator.sendBeacon` is available.
    fn has_beacon(&self) -> bool;

    /// `fetch` is available.
    fn has_fetch(&self) -> bool;

    /// `fetch` accepts the `keepalive` option, required for synchronous
    /// (unload time) fetch sends.
    fn has_fetch_keep_alive(&self) -> bool {
        self.has_fetch()
    }

    /// `XMLHttpRequest` is available.
    fn has_xhr(&self) -> bool;

    /// The legacy `XDomainRequest` object must be used for cross-domain
    /// requests because XHR lacks CORS support.
    fn has_legacy_xdr(&self) -> bool {
        false
    }

    /// A gzip compression primitive is available.
    fn has_compression(&self) -> bool {
        cfg!(feature = "gzip")
    }

    /// Protocol of the hosting page including the trailing colon, e.g.
    /// `"https:"`, if known.
    fn page_protocol(&self) -> Option<String> {
        None
    }
}

/// The transport clients available to a
/// [`SenderPostManager`](crate::SenderPostManager).
///
/// A transport without a client is never selected. `Transports` also
/// implements [`Capabilities`] by reporting exactly the configured clients,
/// which is what a native (non-browser) host wants.
#[derive(Clone, Debug, Default)]
pub struct Transports {
    pub(crate) beacon: Option<Arc<dyn BeaconClient>>,
    pub(crate) fetch: Option<Arc<dyn HttpClient>>,
    pub(crate) xhr: Option<Arc<dyn XhrClient>>,
    pub(crate) xdr: Option<Arc<dyn XdrClient>>,
}

impl Transports {
    /// No transport at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `client` for Beacon sends.
    pub fn with_beacon<C: BeaconClient + 'static>(mut self, client: C) -> Self {
        self.beacon = Some(Arc::new(client));
        self
    }

    /// Uses `client` for Fetch sends.
    pub fn with_fetch<C: HttpClient + 'static>(mut self, client: C) -> Self {
        self.fetch = Some(Arc::new(client));
        self
    }

    /// Uses `client` for XHR sends.
    pub fn with_xhr<C: XhrClient + 'static>(mut self, client: C) -> Self {
        self.xhr = Some(Arc::new(client));
        self
    }

    /// Uses `client` for legacy cross-domain sends.
    pub fn with_xdr<C: XdrClient + 'static>(mut self, client: C) -> Self {
        self.xdr = Some(Arc::new(client));
        self
    }
}

impl Capabilities for Transports {
    fn has_beacon(&self) -> bool {
        self.beacon.is_some()
    }

    fn has_fetch(&self) -> bool {
        self.fetch.is_some()
    }

    fn has_xhr(&self) -> bool {
        self.xhr.is_some()
    }

    fn has_legacy_xdr(&self) -> bool {
        self.xdr.is_some() && self.xhr.is_none()
    }
}
