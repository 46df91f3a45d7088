//! Client-side building blocks for OpenTelemetry in browser-style runtimes.
//!
//! This crate provides the data layer shared by the web SDK components:
//!
//! * [`attributes`]: hierarchical, observable attribute containers with
//!   dotted keys, inheritance, deletion markers and copy-on-write snapshots.
//! * [`global`]: process-wide diagnostic hooks ([`global::ErrorHandlers`])
//!   and guarded invocation of user callbacks.
//! * The `otel_*!` internal logging macros, also used by the transport crate
//!   `opentelemetry-web-sender`.
//!
//! ## Getting started
//!
//! ```
//! use opentelemetry_web::attributes::{create_attribute_container, AttributeFilter, Config};
//!
//! let config = Config::default();
//! let resource = create_attribute_container(&config, "resource", None);
//! resource.set("service.name", "storefront");
//! resource.set("service.version", "1.4.2");
//!
//! let span = resource.child("span", false);
//! span.set("http.request.method", "GET");
//! span.del("service.version");
//!
//! for (key, value, origin) in span.entries() {
//!     let inherited = origin == AttributeFilter::Inherited;
//!     println!("{key}={value} inherited={inherited}");
//! }
//! assert_eq!(span.size(), 2);
//! ```
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs` (enabled by default): emits internal diagnostics through
//!   [`tracing`](https://crates.io/crates/tracing).
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

pub mod global;

pub mod attributes;

mod common;

pub use common::{AttributeArray, AttributeValue};

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
