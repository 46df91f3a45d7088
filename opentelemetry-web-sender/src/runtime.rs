//! Provides an abstraction of the async runtime used for timers and
//! background sends.
//!
//! The sender never depends on a particular executor. Timeouts that the
//! transport itself cannot enforce are simulated with [`Runtime::delay`], and
//! send futures are handed to [`Runtime::spawn`] unless the caller asked to
//! drive them itself. A builtin implementation for [Tokio] is available
//! behind the `rt-tokio` feature.
//!
//! [Tokio]: https://crates.io/crates/tokio
use futures_util::future::BoxFuture;
use std::fmt::Debug;
use std::time::Duration;

/// A runtime is an abstraction of an async runtime like [Tokio]. It lets the
/// sender work with any current and future runtime implementation.
///
/// [Tokio]: https://crates.io/crates/tokio
pub trait Runtime: Debug + Send + Sync + 'static {
    /// Spawn a new task or thread, which executes the given future.
    ///
    /// # Note
    ///
    /// The function does not return a handle. A spawned send always reports
    /// its outcome through its completion callback.
    fn spawn(&self, future: BoxFuture<'static, ()>);

    /// Return a new future, which resolves after the specified [Duration].
    fn delay(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Runtime implementation, which works with Tokio's multi thread runtime.
#[cfg(feature = "rt-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "rt-tokio")))]
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokio;

#[cfg(feature = "rt-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "rt-tokio")))]
impl Runtime for Tokio {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        #[allow(clippy::let_underscore_future)]
        // we don't have to await on the returned future to execute
        let _ = tokio::spawn(future);
    }

    fn delay(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
