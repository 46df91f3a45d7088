//! Transport clients.
//!
//! Each browser transport is reached through a small trait so the send
//! executors can run against real network stacks, browser bindings, or the
//! recording fakes in [`testing`](crate::testing).
use crate::runtime::Runtime;
use async_trait::async_trait;
use futures_util::future::{self, Either};
use http::HeaderMap;
use opentelemetry_web::otel_debug;
use std::collections::HashMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};

use crate::SenderBuildError;

/// Error returned by an [`HttpClient`] when no response was received.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Queues small payloads for delivery, like `navigator.sendBeacon`.
pub trait BeaconClient: Debug + Send + Sync {
    /// Queues `body` for a POST to `url`.
    ///
    /// Returns `false` if the user agent refused to queue it. There is no way
    /// to observe the eventual response.
    fn send_beacon(&self, url: &str, body: Bytes) -> bool;
}

/// A minimal interface necessary for sending requests with fetch semantics.
///
/// Unlike most HTTP helpers, non-success statuses must be returned as
/// `Ok` responses; `Err` is reserved for requests that produced no response
/// at all (network failure, CORS rejection, abort).
///
/// Fetch specific options travel as a [`FetchOptions`] request extension.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with `Bytes` payload.
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

/// Fetch `credentials` mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestCredentials {
    /// Never send cookies or authorization headers.
    Omit,
    /// Send credentials to same-origin endpoints only.
    SameOrigin,
    /// Always send credentials.
    Include,
}

impl RequestCredentials {
    /// The fetch API spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCredentials::Omit => "omit",
            RequestCredentials::SameOrigin => "same-origin",
            RequestCredentials::Include => "include",
        }
    }
}

impl FromStr for RequestCredentials {
    type Err = SenderBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "omit" => Ok(RequestCredentials::Omit),
            "same-origin" => Ok(RequestCredentials::SameOrigin),
            "include" => Ok(RequestCredentials::Include),
            other => Err(SenderBuildError::InvalidCredentials(other.to_string())),
        }
    }
}

/// Fetch options attached to every request as an extension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Let the request outlive the page.
    pub keep_alive: bool,
    /// Credentials mode, `None` for the user agent default.
    pub credentials: Option<RequestCredentials>,
    /// Use `no-cors` mode; the response will be opaque.
    pub no_cors: bool,
}

/// A request for an [`XhrClient`].
#[derive(Debug)]
pub struct XhrRequest {
    /// Method, URL, headers and body.
    pub request: Request<Bytes>,
    /// Block until the request completes.
    pub sync: bool,
    /// Abort after this long and report [`XhrEvent::Timeout`].
    pub timeout: Option<Duration>,
    /// Equivalent of `XMLHttpRequest.withCredentials`.
    pub with_credentials: bool,
}

/// The observable state of a finished XHR.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XhrResponse {
    /// HTTP status, `0` if no response was received.
    pub status: u16,
    /// Response headers with lowercase names.
    pub headers: HashMap<String, String>,
    /// Response text.
    pub body: Option<String>,
}

/// How an XHR finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XhrEvent {
    /// `onload`: a response was received, whatever its status.
    Load(XhrResponse),
    /// `onerror`: the request failed at network level.
    Error(XhrResponse),
    /// `ontimeout`.
    Timeout(XhrResponse),
}

/// Sends requests with `XMLHttpRequest` semantics.
#[async_trait]
pub trait XhrClient: Debug + Send + Sync {
    /// Performs the request and reports which event ended it.
    ///
    /// For a synchronous request the sender drives the returned future to
    /// completion on the calling thread.
    async fn send(&self, request: XhrRequest) -> XhrEvent;
}

/// A request for the legacy `XDomainRequest` object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XdrRequest {
    /// Endpoint URL, possibly protocol-relative.
    pub url: String,
    /// Request text. XDR supports neither headers nor binary bodies.
    pub body: String,
    /// Abort after this long and report [`XdrEvent::Timeout`].
    pub timeout: Option<Duration>,
}

/// How an XDR finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XdrEvent {
    /// `onload` with the response text.
    Load(Option<String>),
    /// `onerror` with whatever response text was available.
    Error(Option<String>),
    /// `ontimeout`.
    Timeout,
}

/// Sends requests through a legacy cross-domain request object.
///
/// The call blocks until one of the XDR events fired.
pub trait XdrClient: Debug + Send + Sync {
    /// Performs the request.
    fn send(&self, request: XdrRequest) -> XdrEvent;
}

/// Collects response headers into a map with lowercase names, skipping
/// values that are not visible ASCII.
pub(crate) fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

pub(crate) fn response_text(body: &Bytes) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(body).into_owned())
    }
}

/// An [`XhrClient`] on top of any [`HttpClient`].
///
/// Timeouts are enforced with the given [`Runtime`]; without one the
/// underlying client's own timeout applies.
#[derive(Debug, Clone)]
pub struct HttpXhrClient<C> {
    client: C,
    runtime: Option<Arc<dyn Runtime>>,
}

impl<C: HttpClient> HttpXhrClient<C> {
    /// Wraps `client`.
    pub fn new(client: C) -> Self {
        HttpXhrClient {
            client,
            runtime: None,
        }
    }

    /// Enforces request timeouts with `runtime`.
    pub fn with_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

#[async_trait]
impl<C: HttpClient> XhrClient for HttpXhrClient<C> {
    async fn send(&self, request: XhrRequest) -> XhrEvent {
        otel_debug!(name: "HttpXhrClient.Send", sync = request.sync);
        let XhrRequest {
            mut request,
            timeout,
            with_credentials,
            ..
        } = request;
        if with_credentials {
            request.extensions_mut().insert(FetchOptions {
                credentials: Some(RequestCredentials::Include),
                ..Default::default()
            });
        }

        let response = match (timeout, &self.runtime) {
            (Some(timeout), Some(runtime)) => {
                match future::select(self.client.send_bytes(request), runtime.delay(timeout)).await
                {
                    Either::Left((response, _)) => response,
                    Either::Right(_) => return XhrEvent::Timeout(XhrResponse::default()),
                }
            }
            _ => self.client.send_bytes(request).await,
        };

        match response {
            Ok(response) => XhrEvent::Load(XhrResponse {
                status: response.status().as_u16(),
                headers: header_map(response.headers()),
                body: response_text(response.body()),
            }),
            Err(err) => XhrEvent::Error(XhrResponse {
                status: 0,
                headers: HashMap::new(),
                body: Some(err.to_string()),
            }),
        }
    }
}

#[cfg(feature = "reqwest")]
mod reqwest {
    use opentelemetry_web::otel_debug;

    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            otel_debug!(name: "ReqwestClient.Send");
            let request = request.try_into()?;
            let mut response = self.execute(request).await?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHttpClient, TestRuntime};
    use rstest::rstest;

    fn xhr_request(timeout: Option<Duration>) -> XhrRequest {
        XhrRequest {
            request: Request::post("https://collector.example/v2/track")
                .body(Bytes::from_static(b"[]"))
                .unwrap(),
            sync: false,
            timeout,
            with_credentials: true,
        }
    }

    #[rstest]
    #[case("omit", RequestCredentials::Omit)]
    #[case("same-origin", RequestCredentials::SameOrigin)]
    #[case("include", RequestCredentials::Include)]
    fn credentials_parse(#[case] input: &str, #[case] expected: RequestCredentials) {
        assert_eq!(input.parse::<RequestCredentials>().unwrap(), expected);
        assert_eq!(expected.as_str(), input);
    }

    #[test]
    fn unknown_credentials_rejected() {
        assert!(matches!(
            "sometimes".parse::<RequestCredentials>(),
            Err(SenderBuildError::InvalidCredentials(value)) if value == "sometimes"
        ));
    }

    #[tokio::test]
    async fn adapter_maps_responses_to_load() {
        let http = RecordingHttpClient::default();
        http.push_response(404, "missing");
        let client = HttpXhrClient::new(http.clone());

        let event = client.send(xhr_request(None)).await;
        assert_eq!(
            event,
            XhrEvent::Load(XhrResponse {
                status: 404,
                headers: HashMap::new(),
                body: Some("missing".to_string()),
            })
        );
        let requests = http.requests();
        assert_eq!(
            requests[0].options.map(|o| o.credentials),
            Some(Some(RequestCredentials::Include))
        );
    }

    #[tokio::test]
    async fn adapter_maps_failures_to_error() {
        let http = RecordingHttpClient::default();
        http.push_error("connection refused");
        let event = HttpXhrClient::new(http).send(xhr_request(None)).await;
        assert!(matches!(event, XhrEvent::Error(XhrResponse { status: 0, .. })));
    }

    #[tokio::test]
    async fn adapter_times_out_with_runtime() {
        let http = RecordingHttpClient::default();
        http.hang();
        let client = HttpXhrClient::new(http).with_runtime(Arc::new(TestRuntime::default()));
        let event = client.send(xhr_request(Some(Duration::from_secs(5)))).await;
        assert!(matches!(event, XhrEvent::Timeout(_)));
    }
}
