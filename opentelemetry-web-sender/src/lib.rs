//! Transport layer for client-side OpenTelemetry exporters.
//!
//! A [`SenderPostManager`] picks the best available transport for each batch
//! (Beacon, Fetch, XHR or the legacy XDomainRequest), honoring configuration
//! switches, environment capabilities and whether the send must finish
//! before the page goes away. Payloads can be gzip compressed beforehand with
//! [`prepare_payload`], without blocking the executor.
//!
//! Every send reports its outcome exactly once through an [`OnComplete`]
//! callback, `(status, headers, body)`, no matter which transport, fallback
//! or hook ends up handling it.
//!
//! ## Getting started
//!
//! ```
//! use opentelemetry_web_sender::{
//!     PayloadData, SenderConfig, SenderPostManager, TransportType, Transports,
//! };
//! # use opentelemetry_web_sender::client::{Bytes, BeaconClient};
//! # #[derive(Debug)]
//! # struct NavigatorBeacon;
//! # impl BeaconClient for NavigatorBeacon {
//! #     fn send_beacon(&self, _url: &str, _body: Bytes) -> bool { true }
//! # }
//!
//! let manager = SenderPostManager::new(
//!     SenderConfig::default(),
//!     Transports::new().with_beacon(NavigatorBeacon),
//! );
//! let sender = manager
//!     .get_sender_inst(&[TransportType::Beacon, TransportType::Xhr], true)
//!     .expect("beacon is available");
//!
//! let payload = PayloadData::new("https://collector.example/v2/track", "[]");
//! sender.send(
//!     payload,
//!     Box::new(|status, _headers, _body| assert_eq!(status, 200)),
//! );
//! ```
//!
//! ## Crate Feature Flags
//!
//! * `gzip` (enabled by default): payload compression with
//!   [`flate2`](https://crates.io/crates/flate2).
//! * `internal-logs` (enabled by default): emits internal diagnostics through
//!   [`tracing`](https://crates.io/crates/tracing).
//! * `reqwest`: implements [`client::HttpClient`] for `reqwest::Client`.
//! * `rt-tokio`: the [`runtime::Tokio`] runtime.
//! * `testing`: recording transport clients in [`testing`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod capabilities;
pub mod client;
mod completion;
mod compression;
mod config;
mod payload;
pub mod runtime;
mod sender;

#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub mod testing;

pub use capabilities::{Capabilities, Transports};
pub use completion::OnComplete;
pub use compression::{
    prepare_payload, CancelHandle, CompressionTask, PayloadCallback, COMPRESSION_CHUNK_SIZE,
};
pub use config::{
    BeaconOnRetry, FetchOnComplete, OnCompleteCallbacks, SenderBuildError, SenderConfig,
    SenderConfigBuilder, XdrOnComplete, XhrOnComplete,
};
pub use payload::{PayloadBody, PayloadData, SendReason};
pub use sender::{
    SendFuture, SenderInstance, SenderPostManager, TransportType, MAX_FETCH_KEEP_ALIVE_BYTES,
};
