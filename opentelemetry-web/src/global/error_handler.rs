use crate::AttributeValue;
use crate::{otel_debug, otel_error, otel_warn};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, RwLock};

/// Diagnostic hooks used by the attribute store and the sender to report
/// failures that are recovered locally.
///
/// Every method is optional. The default implementations forward to the
/// internal logging macros, so an implementation only overrides the hooks it
/// cares about.
pub trait ErrorHandlers: fmt::Debug + Send + Sync {
    /// An attribute could not be stored.
    fn attrib_error(&self, message: &str, key: &str, value: Option<&AttributeValue>) {
        otel_warn!(
            name: "Attributes.Error",
            message = message.to_string(),
            key = key.to_string(),
            value = value.map(|v| v.to_string()).unwrap_or_default()
        );
    }

    /// A span-level operation failed.
    fn span_error(&self, message: &str, span_name: &str) {
        otel_warn!(
            name: "Span.Error",
            message = message.to_string(),
            span_name = span_name.to_string()
        );
    }

    /// Something unexpected but harmless happened.
    fn warn(&self, message: &str) {
        otel_warn!(name: "Diagnostics.Warning", message = message.to_string());
    }

    /// An operation failed.
    fn error(&self, message: &str) {
        otel_error!(name: "Diagnostics.Error", message = message.to_string());
    }

    /// Verbose diagnostics.
    fn debug(&self, message: &str) {
        otel_debug!(name: "Diagnostics.Debug", message = message.to_string());
    }

    /// A caller used functionality this SDK does not provide.
    fn not_implemented(&self, message: &str) {
        otel_warn!(name: "Diagnostics.NotImplemented", message = message.to_string());
    }
}

/// [`ErrorHandlers`] that only uses the default, log-based hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandlers;

impl ErrorHandlers for DefaultErrorHandlers {}

static GLOBAL_ERROR_HANDLERS: OnceLock<RwLock<Arc<dyn ErrorHandlers>>> = OnceLock::new();

#[inline]
fn global_error_handlers() -> &'static RwLock<Arc<dyn ErrorHandlers>> {
    GLOBAL_ERROR_HANDLERS.get_or_init(|| RwLock::new(Arc::new(DefaultErrorHandlers)))
}

/// Sets the process-wide [`ErrorHandlers`].
///
/// Components created with an explicit handler in their configuration keep
/// using that one.
pub fn set_error_handlers<H: ErrorHandlers + 'static>(handlers: H) {
    let _lock = global_error_handlers()
        .write()
        .map(|mut global| *global = Arc::new(handlers));
}

/// Returns the process-wide [`ErrorHandlers`], falling back to
/// [`DefaultErrorHandlers`] if the global lock was poisoned.
pub fn error_handlers() -> Arc<dyn ErrorHandlers> {
    global_error_handlers()
        .read()
        .map(|handlers| handlers.clone())
        .unwrap_or_else(|_| Arc::new(DefaultErrorHandlers))
}

/// Runs a user supplied callback, reporting a panic through `handlers`
/// instead of letting it unwind into the caller.
///
/// Returns `None` if the callback panicked.
pub fn invoke_guarded<R>(
    handlers: &dyn ErrorHandlers,
    context: &str,
    f: impl FnOnce() -> R,
) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(panic) => {
            handlers.error(&format!("{context} panicked: {}", panic_message(&*panic)));
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording {
        errors: Mutex<Vec<String>>,
        spans: Mutex<Vec<(String, String)>>,
    }

    impl ErrorHandlers for Recording {
        fn span_error(&self, message: &str, span_name: &str) {
            self.spans
                .lock()
                .unwrap()
                .push((message.to_string(), span_name.to_string()));
        }

        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn guarded_call_returns_result() {
        let handlers = Recording::default();
        assert_eq!(invoke_guarded(&handlers, "callback", || 7), Some(7));
        assert!(handlers.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn guarded_call_reports_panic() {
        let handlers = Recording::default();
        let result: Option<()> = invoke_guarded(&handlers, "listener", || panic!("boom"));
        assert!(result.is_none());
        let errors = handlers.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], "listener panicked: boom");
    }

    #[test]
    fn overridden_hooks_receive_arguments() {
        let handlers = Recording::default();
        handlers.span_error("ended twice", "GET /");
        // default hooks are still callable
        handlers.warn("unused");
        handlers.not_implemented("links");
        assert_eq!(
            handlers.spans.lock().unwrap()[0],
            ("ended twice".to_string(), "GET /".to_string())
        );
    }

    #[test]
    fn global_handlers_default() {
        let handlers = error_handlers();
        // must not panic
        handlers.attrib_error("rejected", "a.b", Some(&AttributeValue::from("x")));
        handlers.debug("ok");
    }
}
