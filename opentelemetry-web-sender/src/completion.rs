use opentelemetry_web::global::{invoke_guarded, ErrorHandlers};
use opentelemetry_web::otel_debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Completion callback of a send: `(status, response headers, response body)`.
///
/// Status `200` means success. Failures use `400`, `499` or `500` (or the raw
/// HTTP status in 1DS mode); see the executors for the exact mapping.
pub type OnComplete = Box<dyn FnOnce(u16, HashMap<String, String>, Option<String>) + Send>;

/// Status reported when a send is abandoned before any outcome was observed,
/// e.g. because its future was dropped.
pub(crate) const ABANDONED_STATUS: u16 = 500;

/// Owns the completion callback of one send and guarantees it fires exactly
/// once: either through [`Completion::complete`], or with a failure status
/// when the guard is dropped unused.
pub(crate) struct Completion {
    callback: Option<OnComplete>,
    handlers: Arc<dyn ErrorHandlers>,
}

impl Completion {
    pub(crate) fn new(callback: OnComplete, handlers: Arc<dyn ErrorHandlers>) -> Self {
        Completion {
            callback: Some(callback),
            handlers,
        }
    }

    pub(crate) fn complete(
        mut self,
        status: u16,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) {
        self.fire(status, headers, body);
    }

    /// Converts the guard back into a plain callback, for user hooks. The
    /// guard still fires on drop if the hook never calls it.
    pub(crate) fn into_callback(self) -> OnComplete {
        Box::new(move |status, headers, body| self.complete(status, headers, body))
    }

    fn fire(&mut self, status: u16, headers: HashMap<String, String>, body: Option<String>) {
        if let Some(callback) = self.callback.take() {
            otel_debug!(name: "Sender.Complete", status = status);
            invoke_guarded(&*self.handlers, "send completion callback", move || {
                callback(status, headers, body)
            });
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            self.fire(
                ABANDONED_STATUS,
                HashMap::new(),
                Some("Send was abandoned before it completed".to_string()),
            );
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_web::global::DefaultErrorHandlers;
    use std::sync::Mutex;

    fn recorder() -> (OnComplete, Arc<Mutex<Vec<u16>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (
            Box::new(move |status, _, _| sink.lock().unwrap().push(status)),
            calls,
        )
    }

    #[test]
    fn completes_once() {
        let (callback, calls) = recorder();
        Completion::new(callback, Arc::new(DefaultErrorHandlers)).complete(
            200,
            HashMap::new(),
            None,
        );
        assert_eq!(*calls.lock().unwrap(), vec![200]);
    }

    #[test]
    fn drop_reports_failure() {
        let (callback, calls) = recorder();
        drop(Completion::new(callback, Arc::new(DefaultErrorHandlers)));
        assert_eq!(*calls.lock().unwrap(), vec![ABANDONED_STATUS]);
    }

    #[test]
    fn unused_hook_callback_still_fires() {
        let (callback, calls) = recorder();
        let hook_callback = Completion::new(callback, Arc::new(DefaultErrorHandlers)).into_callback();
        drop(hook_callback);
        assert_eq!(*calls.lock().unwrap(), vec![ABANDONED_STATUS]);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let completion = Completion::new(
            Box::new(|_, _, _| panic!("callback failed")),
            Arc::new(DefaultErrorHandlers),
        );
        completion.complete(200, HashMap::new(), None);
    }
}
