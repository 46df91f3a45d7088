//! Recording transport clients and helpers for testing senders.
//!
//! Enabled with the `testing` feature.
use crate::capabilities::Capabilities;
use crate::client::{
    BeaconClient, Bytes, FetchOptions, HttpClient, HttpError, Request, Response, XdrClient,
    XdrEvent, XdrRequest, XhrClient, XhrEvent, XhrRequest, XhrResponse,
};
use crate::completion::OnComplete;
use crate::runtime::Runtime;
use crate::sender::SendFuture;
use async_trait::async_trait;
use futures_util::future::{self, BoxFuture};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Environment capabilities set field by field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCapabilities {
    /// See [`Capabilities::has_beacon`].
    pub beacon: bool,
    /// See [`Capabilities::has_fetch`].
    pub fetch: bool,
    /// See [`Capabilities::has_fetch_keep_alive`].
    pub fetch_keep_alive: bool,
    /// See [`Capabilities::has_xhr`].
    pub xhr: bool,
    /// See [`Capabilities::has_legacy_xdr`].
    pub legacy_xdr: bool,
    /// See [`Capabilities::has_compression`].
    pub compression: bool,
    /// See [`Capabilities::page_protocol`].
    pub page_protocol: Option<String>,
}

impl TestCapabilities {
    /// A modern browser: everything but the legacy XDR.
    pub fn all() -> Self {
        TestCapabilities {
            beacon: true,
            fetch: true,
            fetch_keep_alive: true,
            xhr: true,
            legacy_xdr: false,
            compression: true,
            page_protocol: None,
        }
    }
}

impl Default for TestCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl Capabilities for TestCapabilities {
    fn has_beacon(&self) -> bool {
        self.beacon
    }

    fn has_fetch(&self) -> bool {
        self.fetch
    }

    fn has_fetch_keep_alive(&self) -> bool {
        self.fetch_keep_alive
    }

    fn has_xhr(&self) -> bool {
        self.xhr
    }

    fn has_legacy_xdr(&self) -> bool {
        self.legacy_xdr
    }

    fn has_compression(&self) -> bool {
        self.compression
    }

    fn page_protocol(&self) -> Option<String> {
        self.page_protocol.clone()
    }
}

/// A request as seen by a recording client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request method.
    pub method: String,
    /// Request URL.
    pub uri: String,
    /// Headers with lowercase names.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Bytes,
    /// Fetch options extension, if attached.
    pub options: Option<FetchOptions>,
}

impl RecordedRequest {
    fn new(request: &Request<Bytes>) -> Self {
        RecordedRequest {
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            headers: crate::client::header_map(request.headers()),
            body: request.body().clone(),
            options: request.extensions().get::<FetchOptions>().copied(),
        }
    }
}

/// A [`BeaconClient`] recording every attempt.
#[derive(Clone, Debug, Default)]
pub struct RecordingBeacon {
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<(String, Bytes)>>>,
}

impl RecordingBeacon {
    /// A beacon client whose queue is always full.
    pub fn refusing() -> Self {
        let beacon = Self::default();
        beacon.set_refuse(true);
        beacon
    }

    /// Makes subsequent beacons fail (`true`) or succeed.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of `send_beacon` calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted beacons as `(url, body)`.
    pub fn sent(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl BeaconClient for RecordingBeacon {
    fn send_beacon(&self, url: &str, body: Bytes) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((url.to_string(), body));
        }
        true
    }
}

#[derive(Debug)]
enum Reply {
    Response(u16, Bytes),
    Error(String),
}

/// An [`HttpClient`] recording requests and replaying queued outcomes.
///
/// Without queued outcomes every request gets an empty `200` response.
#[derive(Clone, Debug, Default)]
pub struct RecordingHttpClient {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    hang: Arc<AtomicBool>,
}

impl RecordingHttpClient {
    /// Queues a response.
    pub fn push_response(&self, status: u16, body: impl Into<Bytes>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Reply::Response(status, body.into()));
        }
    }

    /// Queues a request failure.
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Reply::Error(message.into()));
        }
    }

    /// Makes every subsequent request hang forever.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> Reply {
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or(Reply::Response(200, Bytes::new()))
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest::new(&request));
        }
        if self.hang.load(Ordering::SeqCst) {
            return future::pending().await;
        }
        match self.next_reply() {
            Reply::Response(status, body) => Ok(Response::builder().status(status).body(body)?),
            Reply::Error(message) => Err(message.into()),
        }
    }
}

/// A request as seen by [`RecordingXhr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedXhr {
    /// The HTTP request.
    pub request: RecordedRequest,
    /// See [`XhrRequest::sync`].
    pub sync: bool,
    /// See [`XhrRequest::timeout`].
    pub timeout: Option<Duration>,
    /// See [`XhrRequest::with_credentials`].
    pub with_credentials: bool,
}

/// An [`XhrClient`] recording requests and replaying queued events.
///
/// Without queued events every request loads with an empty `200` response.
#[derive(Clone, Debug, Default)]
pub struct RecordingXhr {
    requests: Arc<Mutex<Vec<RecordedXhr>>>,
    events: Arc<Mutex<VecDeque<XhrEvent>>>,
}

impl RecordingXhr {
    /// Queues the event ending the next request.
    pub fn push_event(&self, event: XhrEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedXhr> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl XhrClient for RecordingXhr {
    async fn send(&self, request: XhrRequest) -> XhrEvent {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedXhr {
                request: RecordedRequest::new(&request.request),
                sync: request.sync,
                timeout: request.timeout,
                with_credentials: request.with_credentials,
            });
        }
        self.events
            .lock()
            .ok()
            .and_then(|mut events| events.pop_front())
            .unwrap_or_else(|| {
                XhrEvent::Load(XhrResponse {
                    status: 200,
                    ..Default::default()
                })
            })
    }
}

/// An [`XdrClient`] recording requests and replaying queued events.
///
/// Without queued events every request loads with no response text.
#[derive(Clone, Debug, Default)]
pub struct RecordingXdr {
    requests: Arc<Mutex<Vec<XdrRequest>>>,
    events: Arc<Mutex<VecDeque<XdrEvent>>>,
}

impl RecordingXdr {
    /// Queues the event ending the next request.
    pub fn push_event(&self, event: XdrEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<XdrRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl XdrClient for RecordingXdr {
    fn send(&self, request: XdrRequest) -> XdrEvent {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.events
            .lock()
            .ok()
            .and_then(|mut events| events.pop_front())
            .unwrap_or(XdrEvent::Load(None))
    }
}

/// One call of a completion callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedSend {
    /// Reported status.
    pub status: u16,
    /// Reported response headers.
    pub headers: HashMap<String, String>,
    /// Reported response body.
    pub body: Option<String>,
}

/// Hands out completion callbacks and records their calls.
#[derive(Clone, Debug, Default)]
pub struct CompletionRecorder {
    calls: Arc<Mutex<Vec<CompletedSend>>>,
}

impl CompletionRecorder {
    /// A callback recording into this recorder.
    pub fn callback(&self) -> OnComplete {
        let calls = self.calls.clone();
        Box::new(move |status, headers, body| {
            if let Ok(mut calls) = calls.lock() {
                calls.push(CompletedSend {
                    status,
                    headers,
                    body,
                });
            }
        })
    }

    /// Recorded calls in order.
    pub fn calls(&self) -> Vec<CompletedSend> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Statuses of the recorded calls.
    pub fn statuses(&self) -> Vec<u16> {
        self.calls().into_iter().map(|call| call.status).collect()
    }

    /// Number of recorded calls.
    pub fn count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }
}

/// A [`Runtime`] whose timers fire immediately and whose spawned futures
/// run only when asked to.
#[derive(Clone, Default)]
pub struct TestRuntime {
    spawned: Arc<Mutex<Vec<SendFuture>>>,
}

impl TestRuntime {
    /// Runs every future spawned so far to completion on the calling thread
    /// and returns how many there were.
    pub fn run_spawned(&self) -> usize {
        let spawned = self
            .spawned
            .lock()
            .map(|mut spawned| std::mem::take(&mut *spawned))
            .unwrap_or_default();
        let count = spawned.len();
        for future in spawned {
            futures_executor::block_on(future);
        }
        count
    }
}

impl fmt::Debug for TestRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.spawned.lock().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("TestRuntime").field("pending", &pending).finish()
    }
}

impl Runtime for TestRuntime {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        if let Ok(mut spawned) = self.spawned.lock() {
            spawned.push(future);
        }
    }

    fn delay(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(future::ready(()))
    }
}
