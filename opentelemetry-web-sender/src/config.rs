use crate::client::{Bytes, RequestCredentials, Response, XhrResponse};
use crate::completion::OnComplete;
use crate::runtime::Runtime;
use crate::PayloadData;
use opentelemetry_web::global::{self, ErrorHandlers};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Invalid sender configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SenderBuildError {
    /// Not one of `omit`, `same-origin` or `include`.
    #[error("invalid fetch credentials mode '{0}'")]
    InvalidCredentials(String),
}

/// Replaces the default handling of a fetch response.
pub type FetchOnComplete = Arc<dyn Fn(&Response<Bytes>, OnComplete, &PayloadData) + Send + Sync>;
/// Replaces the default handling of a loaded XHR.
pub type XhrOnComplete = Arc<dyn Fn(&XhrResponse, OnComplete, &PayloadData) + Send + Sync>;
/// Replaces the default handling of a loaded XDR.
pub type XdrOnComplete = Arc<dyn Fn(Option<&str>, OnComplete, &PayloadData) + Send + Sync>;
/// Called when a beacon could not be queued, instead of the fallback
/// transport. The last argument re-attempts a beacon send.
pub type BeaconOnRetry =
    Arc<dyn Fn(&PayloadData, OnComplete, &dyn Fn(&PayloadData) -> bool) + Send + Sync>;

/// Hooks overriding how individual transports finish a send.
///
/// Every hook receives the completion callback and becomes responsible for
/// calling it. A hook that drops it without calling it completes the send
/// with a failure status.
#[derive(Clone, Default)]
pub struct OnCompleteCallbacks {
    /// See [`FetchOnComplete`].
    pub fetch_on_complete: Option<FetchOnComplete>,
    /// See [`XhrOnComplete`].
    pub xhr_on_complete: Option<XhrOnComplete>,
    /// See [`XdrOnComplete`].
    pub xdr_on_complete: Option<XdrOnComplete>,
    /// See [`BeaconOnRetry`].
    pub beacon_on_retry: Option<BeaconOnRetry>,
}

impl fmt::Debug for OnCompleteCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCompleteCallbacks")
            .field("fetch_on_complete", &self.fetch_on_complete.is_some())
            .field("xhr_on_complete", &self.xhr_on_complete.is_some())
            .field("xdr_on_complete", &self.xdr_on_complete.is_some())
            .field("beacon_on_retry", &self.beacon_on_retry.is_some())
            .finish()
    }
}

/// Options controlling transport selection and behavior.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct SenderConfig {
    /// Return send futures to the caller instead of spawning them.
    pub enable_send_promise: bool,
    /// Use the 1DS flavor of the collector protocol.
    pub is_one_ds: bool,
    /// Never send credentials.
    pub disable_credentials: bool,
    /// Never select XHR (or XDR).
    pub disable_xhr: bool,
    /// Never select Beacon for asynchronous sends.
    pub disable_beacon: bool,
    /// Never select Beacon for synchronous sends.
    pub disable_beacon_sync: bool,
    /// Never select a keep-alive fetch for synchronous sends.
    pub disable_fetch_keep_alive: bool,
    /// In 1DS mode, send unload-time fetches in `no-cors` mode.
    pub add_no_response: bool,
    /// Explicit fetch credentials mode.
    pub fetch_credentials: Option<RequestCredentials>,
    /// Transport completion overrides.
    pub sender_on_complete_callbacks: OnCompleteCallbacks,
    /// Timer and spawner, see [`Runtime`].
    pub time_wrapper: Option<Arc<dyn Runtime>>,
    error_handlers: Option<Arc<dyn ErrorHandlers>>,
}

impl SenderConfig {
    /// Starts a [`SenderConfigBuilder`].
    pub fn builder() -> SenderConfigBuilder {
        SenderConfigBuilder::default()
    }

    pub(crate) fn resolve_error_handlers(&self) -> Arc<dyn ErrorHandlers> {
        self.error_handlers
            .clone()
            .unwrap_or_else(global::error_handlers)
    }
}

/// Builder for [`SenderConfig`].
#[derive(Clone, Debug, Default)]
pub struct SenderConfigBuilder {
    config: SenderConfig,
}

impl SenderConfigBuilder {
    /// Return send futures to the caller instead of spawning them on the
    /// configured runtime.
    pub fn with_enable_send_promise(mut self, enable: bool) -> Self {
        self.config.enable_send_promise = enable;
        self
    }

    /// Use the 1DS flavor of the collector protocol.
    pub fn with_is_one_ds(mut self, is_one_ds: bool) -> Self {
        self.config.is_one_ds = is_one_ds;
        self
    }

    /// Never send credentials.
    pub fn with_disable_credentials(mut self, disable: bool) -> Self {
        self.config.disable_credentials = disable;
        self
    }

    /// Never select XHR (or XDR).
    pub fn with_disable_xhr(mut self, disable: bool) -> Self {
        self.config.disable_xhr = disable;
        self
    }

    /// Never select Beacon for asynchronous sends.
    pub fn with_disable_beacon(mut self, disable: bool) -> Self {
        self.config.disable_beacon = disable;
        self
    }

    /// Never select Beacon for synchronous sends.
    pub fn with_disable_beacon_sync(mut self, disable: bool) -> Self {
        self.config.disable_beacon_sync = disable;
        self
    }

    /// Never select a keep-alive fetch for synchronous sends.
    pub fn with_disable_fetch_keep_alive(mut self, disable: bool) -> Self {
        self.config.disable_fetch_keep_alive = disable;
        self
    }

    /// In 1DS mode, send unload-time fetches in `no-cors` mode.
    pub fn with_add_no_response(mut self, add: bool) -> Self {
        self.config.add_no_response = add;
        self
    }

    /// Sets the fetch credentials mode.
    pub fn with_fetch_credentials(mut self, credentials: RequestCredentials) -> Self {
        self.config.fetch_credentials = Some(credentials);
        self
    }

    /// Installs transport completion overrides.
    pub fn with_on_complete_callbacks(mut self, callbacks: OnCompleteCallbacks) -> Self {
        self.config.sender_on_complete_callbacks = callbacks;
        self
    }

    /// Uses `runtime` for timers and for spawning send futures.
    pub fn with_runtime<R: Runtime>(mut self, runtime: R) -> Self {
        self.config.time_wrapper = Some(Arc::new(runtime));
        self
    }

    /// Routes diagnostics to `handlers` instead of the global ones.
    pub fn with_error_handlers<H: ErrorHandlers + 'static>(mut self, handlers: H) -> Self {
        self.config.error_handlers = Some(Arc::new(handlers));
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> SenderConfig {
        self.config
    }
}
