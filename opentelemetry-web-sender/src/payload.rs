use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Body of a [`PayloadData`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadBody {
    /// A serialized text batch, usually JSON.
    Text(String),
    /// Binary content, e.g. a compressed batch.
    Binary(Bytes),
}

impl PayloadBody {
    /// Length of the body in bytes.
    pub fn len(&self) -> usize {
        match self {
            PayloadBody::Text(text) => text.len(),
            PayloadBody::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the body holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The body as bytes. Cheap for binary bodies.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            PayloadBody::Text(text) => Bytes::from(text.clone()),
            PayloadBody::Binary(bytes) => bytes.clone(),
        }
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn to_text(&self) -> String {
        match self {
            PayloadBody::Text(text) => text.clone(),
            PayloadBody::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl Default for PayloadBody {
    fn default() -> Self {
        PayloadBody::Text(String::new())
    }
}

impl From<String> for PayloadBody {
    fn from(text: String) -> Self {
        PayloadBody::Text(text)
    }
}

impl From<&str> for PayloadBody {
    fn from(text: &str) -> Self {
        PayloadBody::Text(text.to_string())
    }
}

impl From<Bytes> for PayloadBody {
    fn from(bytes: Bytes) -> Self {
        PayloadBody::Binary(bytes)
    }
}

impl From<Vec<u8>> for PayloadBody {
    fn from(bytes: Vec<u8>) -> Self {
        PayloadBody::Binary(bytes.into())
    }
}

/// Why a batch is being sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendReason {
    /// Regular scheduled flush.
    #[default]
    Normal,
    /// The page is being unloaded; the response will most likely never be
    /// observed.
    Unload,
    /// Explicit flush requested by the application.
    ManualFlush,
    /// Retry of a previously failed batch.
    Retry,
}

/// A batch ready to be posted to a collector endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PayloadData {
    /// Endpoint URL.
    pub url: String,
    /// Batch content.
    pub data: PayloadBody,
    /// Extra request headers. Ignored by Beacon and XDR, which cannot send
    /// custom headers.
    pub headers: HashMap<String, String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Turn a synchronous XHR send of this batch into an asynchronous one
    /// (1DS mode only).
    pub disable_xhr_sync: bool,
    /// Never use a keep-alive fetch for this batch.
    pub disable_fetch_keep_alive: bool,
    /// Why the batch is sent.
    pub send_reason: Option<SendReason>,
}

impl PayloadData {
    /// A payload for `url` with the given body and no headers.
    pub fn new(url: impl Into<String>, data: impl Into<PayloadBody>) -> Self {
        PayloadData {
            url: url.into(),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Records why the batch is sent.
    pub fn with_send_reason(mut self, reason: SendReason) -> Self {
        self.send_reason = Some(reason);
        self
    }
}

impl fmt::Debug for PayloadData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadData")
            .field("url", &self.url)
            .field("bytes", &self.data.len())
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("send_reason", &self.send_reason)
            .finish()
    }
}
