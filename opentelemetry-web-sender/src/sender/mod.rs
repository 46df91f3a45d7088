//! Transport selection and send executors.
//!
//! A [`SenderPostManager`] owns the configured transport clients. Callers ask
//! it for a [`SenderInstance`] for an ordered list of acceptable transports
//! and a sync/async mode, then post payloads through that instance. Every
//! send reports its outcome exactly once through its [`OnComplete`] callback.
use crate::capabilities::{Capabilities, Transports};
use crate::client::{FetchOptions, Request};
use crate::completion::{Completion, OnComplete};
use crate::compression::{self, CompressionTask};
use crate::config::SenderConfig;
use crate::payload::PayloadData;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::CONTENT_TYPE;
use opentelemetry_web::global::ErrorHandlers;
use opentelemetry_web::{otel_debug, otel_info, otel_warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

mod beacon;
mod fetch;
mod xdr;
mod xhr;

/// A send that still has to be driven to completion.
///
/// The future resolves once the completion callback has been called.
pub type SendFuture = BoxFuture<'static, ()>;

/// Maximum number of body bytes that may be in flight in keep-alive fetches
/// at once. User agents reject keep-alive requests beyond this budget.
pub const MAX_FETCH_KEEP_ALIVE_BYTES: usize = 65_000;

const NO_ENDPOINT_MESSAGE: &str = "No endpoint url is provided for the batch";
const NO_TRANSPORT_MESSAGE: &str = "No supported transport is available for the batch";

/// Transports a batch can be posted with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Placeholder, never selected.
    #[default]
    NotSet,
    /// `XMLHttpRequest`, or the legacy `XDomainRequest` where XHR lacks CORS.
    Xhr,
    /// `fetch`, with `keepalive` for synchronous sends.
    Fetch,
    /// `navigator.sendBeacon`.
    Beacon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Executor {
    Beacon,
    Fetch,
    FetchKeepAlive,
    Xhr,
    Xdr,
}

#[derive(Debug)]
struct ManagerInner {
    config: SenderConfig,
    transports: Transports,
    caps: Arc<dyn Capabilities>,
    handlers: Arc<dyn ErrorHandlers>,
    sync_fetch_payload: AtomicUsize,
    enabled: AtomicBool,
}

/// Selects transports and posts payloads through them.
///
/// Cloning is cheap; clones share the keep-alive budget and the teardown
/// state.
#[derive(Clone, Debug)]
pub struct SenderPostManager {
    inner: Arc<ManagerInner>,
}

/// A transport chosen by [`SenderPostManager::get_sender_inst`].
#[derive(Clone, Debug)]
pub struct SenderInstance {
    manager: SenderPostManager,
    transport: TransportType,
    is_sync: bool,
    executor: Executor,
}

impl SenderInstance {
    /// The selected transport.
    pub fn transport(&self) -> TransportType {
        self.transport
    }

    /// Whether sends block until the outcome is known.
    pub fn is_sync(&self) -> bool {
        self.is_sync
    }

    /// Posts `payload`.
    ///
    /// `on_complete` is called exactly once. When the outcome is not known
    /// before this call returns, the remaining work is either spawned on the
    /// configured runtime or returned as a [`SendFuture`] for the caller to
    /// drive, depending on [`SenderConfig::enable_send_promise`].
    pub fn send(&self, payload: PayloadData, on_complete: OnComplete) -> Option<SendFuture> {
        self.manager
            .execute(self.executor, payload, on_complete, self.is_sync)
    }
}

impl SenderPostManager {
    /// A manager whose capabilities are exactly the configured clients.
    pub fn new(config: SenderConfig, transports: Transports) -> Self {
        let caps = Arc::new(transports.clone());
        Self::with_capabilities(config, transports, caps)
    }

    /// A manager with explicit environment capabilities.
    ///
    /// A transport is selected only if it is both reported by `caps` and
    /// backed by a client in `transports`.
    pub fn with_capabilities(
        config: SenderConfig,
        transports: Transports,
        caps: Arc<dyn Capabilities>,
    ) -> Self {
        let handlers = config.resolve_error_handlers();
        otel_info!(
            name: "Sender.Initialized",
            beacon = caps.has_beacon(),
            fetch = caps.has_fetch(),
            xhr = caps.has_xhr(),
            legacy_xdr = caps.has_legacy_xdr()
        );
        SenderPostManager {
            inner: Arc::new(ManagerInner {
                config,
                transports,
                caps,
                handlers,
                sync_fetch_payload: AtomicUsize::new(0),
                enabled: AtomicBool::new(true),
            }),
        }
    }

    /// Returns the first transport of `transports` that is enabled by the
    /// configuration, supported by the environment and usable in the
    /// requested mode, or `None` if there is none.
    pub fn get_sender_inst(
        &self,
        transports: &[TransportType],
        sync: bool,
    ) -> Option<SenderInstance> {
        if !self.inner.enabled.load(Ordering::Acquire) {
            return None;
        }
        transports.iter().find_map(|transport| {
            self.executor_for(*transport, sync)
                .map(|executor| SenderInstance {
                    manager: self.clone(),
                    transport: *transport,
                    is_sync: sync,
                    executor,
                })
        })
    }

    /// An XHR-only instance.
    pub fn get_xhr_inst(&self, sync: bool) -> Option<SenderInstance> {
        self.get_sender_inst(&[TransportType::Xhr], sync)
    }

    /// The synchronous XHR (or XDR) instance used when a primary transport
    /// fails.
    pub fn get_fallback_inst(&self) -> Option<SenderInstance> {
        if !self.inner.enabled.load(Ordering::Acquire) {
            return None;
        }
        self.fallback_executor().map(|executor| SenderInstance {
            manager: self.clone(),
            transport: TransportType::Xhr,
            is_sync: true,
            executor,
        })
    }

    /// Posts `payload` with the first usable transport of `transports`.
    ///
    /// If none qualifies, `on_complete` receives status `400`.
    pub fn send(
        &self,
        transports: &[TransportType],
        payload: PayloadData,
        on_complete: OnComplete,
        sync: bool,
    ) -> Option<SendFuture> {
        match self.get_sender_inst(transports, sync) {
            Some(instance) => instance.send(payload, on_complete),
            None => {
                self.on_no_endpoint(self.completion(on_complete), NO_TRANSPORT_MESSAGE);
                None
            }
        }
    }

    /// [`prepare_payload`](crate::prepare_payload), additionally skipping
    /// compression when the environment reports no compression support.
    pub fn prepare_payload<F>(
        &self,
        callback: F,
        zip: bool,
        payload: PayloadData,
        is_sync: bool,
    ) -> Option<CompressionTask>
    where
        F: FnOnce(PayloadData) + Send + 'static,
    {
        let zip = zip && self.inner.caps.has_compression();
        compression::prepare_payload(callback, zip, payload, is_sync)
    }

    /// Bytes currently in flight in keep-alive fetches.
    pub fn sync_fetch_payload(&self) -> usize {
        self.inner.sync_fetch_payload.load(Ordering::Acquire)
    }

    /// Disables the manager: no instance is handed out afterwards. Sends
    /// already in flight still complete.
    pub fn teardown(&self) {
        if self.inner.enabled.swap(false, Ordering::AcqRel) {
            otel_debug!(name: "Sender.Teardown");
        }
    }

    fn executor_for(&self, transport: TransportType, sync: bool) -> Option<Executor> {
        let config = &self.inner.config;
        let caps = &*self.inner.caps;
        let clients = &self.inner.transports;
        match transport {
            TransportType::NotSet => None,
            TransportType::Xhr => {
                if config.disable_xhr {
                    None
                } else if caps.has_legacy_xdr() && clients.xdr.is_some() {
                    Some(Executor::Xdr)
                } else if caps.has_xhr() && clients.xhr.is_some() {
                    Some(Executor::Xhr)
                } else {
                    None
                }
            }
            TransportType::Fetch => {
                if clients.fetch.is_none() {
                    None
                } else if sync {
                    (caps.has_fetch_keep_alive() && !config.disable_fetch_keep_alive)
                        .then_some(Executor::FetchKeepAlive)
                } else {
                    caps.has_fetch().then_some(Executor::Fetch)
                }
            }
            TransportType::Beacon => {
                let disabled = if sync {
                    config.disable_beacon_sync
                } else {
                    config.disable_beacon
                };
                (!disabled && caps.has_beacon() && clients.beacon.is_some())
                    .then_some(Executor::Beacon)
            }
        }
    }

    fn fallback_executor(&self) -> Option<Executor> {
        let caps = &*self.inner.caps;
        let clients = &self.inner.transports;
        if caps.has_legacy_xdr() && clients.xdr.is_some() {
            Some(Executor::Xdr)
        } else if caps.has_xhr() && clients.xhr.is_some() {
            Some(Executor::Xhr)
        } else {
            None
        }
    }

    fn completion(&self, on_complete: OnComplete) -> Completion {
        Completion::new(on_complete, self.inner.handlers.clone())
    }

    fn execute(
        &self,
        executor: Executor,
        payload: PayloadData,
        on_complete: OnComplete,
        sync: bool,
    ) -> Option<SendFuture> {
        let future = self.run(executor, payload, self.completion(on_complete), sync);
        self.dispatch(future)
    }

    fn run(
        &self,
        executor: Executor,
        payload: PayloadData,
        completion: Completion,
        sync: bool,
    ) -> Option<SendFuture> {
        if payload.url.is_empty() {
            self.on_no_endpoint(completion, NO_ENDPOINT_MESSAGE);
            return None;
        }
        otel_debug!(
            name: "Sender.Send",
            executor = format!("{executor:?}"),
            sync = sync,
            bytes = payload.data.len()
        );
        match executor {
            Executor::Beacon => self.beacon_send(payload, completion),
            Executor::Fetch => self.fetch_send(payload, completion, sync),
            Executor::FetchKeepAlive => self.fetch_keep_alive_send(payload, completion),
            Executor::Xhr => self.xhr_send(payload, completion, sync),
            Executor::Xdr => self.xdr_send(payload, completion),
        }
    }

    /// Retries with the synchronous fallback transport.
    fn run_fallback(&self, payload: PayloadData, completion: Completion) -> Option<SendFuture> {
        match self.fallback_executor() {
            Some(executor) => self.run(executor, payload, completion, true),
            None => {
                self.on_no_endpoint(completion, NO_TRANSPORT_MESSAGE);
                None
            }
        }
    }

    fn dispatch(&self, future: Option<SendFuture>) -> Option<SendFuture> {
        let future = future?;
        match &self.inner.config.time_wrapper {
            Some(runtime) if !self.inner.config.enable_send_promise => {
                runtime.spawn(future);
                None
            }
            _ => Some(future),
        }
    }

    fn on_no_endpoint(&self, completion: Completion, message: &str) {
        otel_warn!(name: "Sender.NoEndpoint", message = message.to_string());
        completion.complete(400, HashMap::new(), Some(message.to_string()));
    }
}

/// Builds the POST request shared by the fetch and XHR executors.
fn build_request(
    payload: &PayloadData,
    json_content_type: bool,
    options: Option<FetchOptions>,
) -> Result<Request<Bytes>, http::Error> {
    let mut builder = Request::post(payload.url.as_str());
    let has_content_type = payload
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
    if json_content_type && !has_content_type {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }
    for (name, value) in &payload.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(options) = options {
        builder = builder.extension(options);
    }
    builder.body(payload.data.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        CompletionRecorder, RecordingBeacon, RecordingHttpClient, RecordingXdr, RecordingXhr,
        TestCapabilities, TestRuntime,
    };
    use rstest::rstest;
    use super::TransportType::{Beacon, Fetch, NotSet, Xhr};

    fn all_transports() -> Transports {
        Transports::new()
            .with_beacon(RecordingBeacon::default())
            .with_fetch(RecordingHttpClient::default())
            .with_xhr(RecordingXhr::default())
    }

    fn manager(config: SenderConfig) -> SenderPostManager {
        SenderPostManager::new(config, all_transports())
    }

    #[rstest]
    #[case(&[Beacon, Fetch, Xhr], false, Some(Beacon))]
    #[case(&[NotSet, Fetch, Xhr], false, Some(Fetch))]
    #[case(&[Xhr, Beacon], true, Some(Xhr))]
    #[case(&[NotSet], false, None)]
    #[case(&[], true, None)]
    fn selects_first_usable_transport(
        #[case] order: &[TransportType],
        #[case] sync: bool,
        #[case] expected: Option<TransportType>,
    ) {
        let instance = manager(SenderConfig::default()).get_sender_inst(order, sync);
        assert_eq!(instance.as_ref().map(SenderInstance::transport), expected);
        if let Some(instance) = instance {
            assert_eq!(instance.is_sync(), sync);
        }
    }

    #[rstest]
    #[case::beacon_async(SenderConfig::builder().with_disable_beacon(true).build(), false, Fetch)]
    #[case::beacon_sync(SenderConfig::builder().with_disable_beacon_sync(true).build(), true, Fetch)]
    #[case::beacon_sync_only(SenderConfig::builder().with_disable_beacon_sync(true).build(), false, Beacon)]
    #[case::keep_alive(
        SenderConfig::builder()
            .with_disable_beacon_sync(true)
            .with_disable_fetch_keep_alive(true)
            .build(),
        true,
        Xhr
    )]
    fn configuration_disables_transports(
        #[case] config: SenderConfig,
        #[case] sync: bool,
        #[case] expected: TransportType,
    ) {
        let instance = manager(config)
            .get_sender_inst(&[Beacon, Fetch, Xhr], sync)
            .unwrap();
        assert_eq!(instance.transport(), expected);
    }

    #[test]
    fn disabled_xhr_has_no_xhr_instance() {
        let manager = manager(SenderConfig::builder().with_disable_xhr(true).build());
        assert!(manager.get_xhr_inst(false).is_none());
        // the fallback ignores the switch
        assert!(manager.get_fallback_inst().is_some());
    }

    #[test]
    fn capabilities_and_clients_must_agree() {
        let caps = TestCapabilities {
            beacon: false,
            ..TestCapabilities::all()
        };
        let manager =
            SenderPostManager::with_capabilities(SenderConfig::default(), all_transports(), Arc::new(caps));
        let instance = manager.get_sender_inst(&[Beacon, Fetch], false).unwrap();
        assert_eq!(instance.transport(), Fetch);

        let manager = SenderPostManager::with_capabilities(
            SenderConfig::default(),
            Transports::new().with_xhr(RecordingXhr::default()),
            Arc::new(TestCapabilities::all()),
        );
        assert!(manager.get_sender_inst(&[Beacon, Fetch], false).is_none());
    }

    #[test]
    fn legacy_xdr_replaces_xhr() {
        let xdr = RecordingXdr::default();
        let manager = SenderPostManager::new(
            SenderConfig::default(),
            Transports::new().with_xdr(xdr.clone()),
        );
        let recorder = CompletionRecorder::default();
        let instance = manager.get_xhr_inst(false).unwrap();
        assert_eq!(instance.transport(), Xhr);
        assert!(instance
            .send(PayloadData::new("https://dc.example/v2/track", "[]"), recorder.callback())
            .is_none());
        assert_eq!(xdr.requests().len(), 1);
        assert_eq!(recorder.statuses(), vec![200]);
    }

    #[test]
    fn teardown_disables_selection() {
        let manager = manager(SenderConfig::default());
        let instance = manager.get_sender_inst(&[Beacon], false).unwrap();
        manager.teardown();
        assert!(manager.get_sender_inst(&[Beacon, Fetch, Xhr], false).is_none());
        assert!(manager.get_fallback_inst().is_none());

        // instances handed out before still work
        let recorder = CompletionRecorder::default();
        instance.send(PayloadData::new("https://dc.example", "[]"), recorder.callback());
        assert_eq!(recorder.statuses(), vec![200]);
    }

    #[rstest]
    #[case(Beacon, false)]
    #[case(Fetch, false)]
    #[case(Fetch, true)]
    #[case(Xhr, false)]
    #[case(Xhr, true)]
    fn missing_url_completes_with_400(#[case] transport: TransportType, #[case] sync: bool) {
        let manager = manager(SenderConfig::default());
        let recorder = CompletionRecorder::default();
        let future = manager
            .get_sender_inst(&[transport], sync)
            .unwrap()
            .send(PayloadData::new("", "[]"), recorder.callback());
        assert!(future.is_none());
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].status, 400);
        assert_eq!(calls[0].body.as_deref(), Some(NO_ENDPOINT_MESSAGE));
    }

    #[test]
    fn send_without_usable_transport_completes_with_400() {
        let manager = SenderPostManager::new(SenderConfig::default(), Transports::new());
        let recorder = CompletionRecorder::default();
        let future = manager.send(
            &[Beacon, Fetch, Xhr],
            PayloadData::new("https://dc.example", "[]"),
            recorder.callback(),
            false,
        );
        assert!(future.is_none());
        assert_eq!(recorder.statuses(), vec![400]);
    }

    #[test]
    fn futures_are_spawned_on_the_runtime() {
        let runtime = TestRuntime::default();
        let manager = manager(
            SenderConfig::builder()
                .with_runtime(runtime.clone())
                .build(),
        );
        let recorder = CompletionRecorder::default();
        let future = manager.send(
            &[Fetch],
            PayloadData::new("https://dc.example", "[]"),
            recorder.callback(),
            false,
        );
        assert!(future.is_none());
        assert_eq!(recorder.count(), 0);
        assert_eq!(runtime.run_spawned(), 1);
        assert_eq!(recorder.statuses(), vec![200]);
    }

    #[test]
    fn send_promise_returns_future_to_caller() {
        let runtime = TestRuntime::default();
        let manager = manager(
            SenderConfig::builder()
                .with_runtime(runtime.clone())
                .with_enable_send_promise(true)
                .build(),
        );
        let recorder = CompletionRecorder::default();
        let future = manager
            .send(
                &[Fetch],
                PayloadData::new("https://dc.example", "[]"),
                recorder.callback(),
                false,
            )
            .unwrap();
        futures_executor::block_on(future);
        assert_eq!(runtime.run_spawned(), 0);
        assert_eq!(recorder.statuses(), vec![200]);
    }

    #[test]
    fn dropped_future_still_completes() {
        let manager = manager(SenderConfig::default());
        let recorder = CompletionRecorder::default();
        let future = manager
            .send(
                &[Fetch],
                PayloadData::new("https://dc.example", "[]"),
                recorder.callback(),
                false,
            )
            .unwrap();
        drop(future);
        assert_eq!(recorder.statuses(), vec![crate::completion::ABANDONED_STATUS]);
    }

    #[test]
    fn request_carries_json_content_type_and_headers() {
        let payload = PayloadData::new("https://dc.example/v2/track", "[]").with_header("x-ms-id", "1");
        let request = build_request(&payload, true, Some(FetchOptions::default())).unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()["x-ms-id"], "1");
        assert!(request.extensions().get::<FetchOptions>().is_some());

        let payload = payload.with_header("Content-Type", "application/x-json-stream");
        let request = build_request(&payload, true, None).unwrap();
        assert_eq!(request.headers().get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/x-json-stream");
    }
}
