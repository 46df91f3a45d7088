use super::{build_request, SendFuture, SenderPostManager, MAX_FETCH_KEEP_ALIVE_BYTES};
use crate::client::{header_map, response_text, Bytes, FetchOptions, RequestCredentials, Response};
use crate::completion::Completion;
use crate::payload::{PayloadData, SendReason};
use futures_util::future::{self, Either};
use opentelemetry_web::global::invoke_guarded;
use opentelemetry_web::{otel_debug, otel_warn};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

impl SenderPostManager {
    /// Synchronous fetch: a keep-alive request, as long as the in-flight
    /// keep-alive bytes stay within [`MAX_FETCH_KEEP_ALIVE_BYTES`].
    pub(super) fn fetch_keep_alive_send(
        &self,
        payload: PayloadData,
        completion: Completion,
    ) -> Option<SendFuture> {
        let in_flight = self.inner.sync_fetch_payload.load(Ordering::Acquire);
        let size = payload.data.len();
        if !payload.disable_fetch_keep_alive && in_flight + size <= MAX_FETCH_KEEP_ALIVE_BYTES {
            return self.fetch_send(payload, completion, true);
        }
        otel_debug!(
            name: "Sender.KeepAliveBudgetExceeded",
            in_flight = in_flight,
            bytes = size
        );
        self.run_fallback(payload, completion)
    }

    pub(super) fn fetch_send(
        &self,
        payload: PayloadData,
        completion: Completion,
        sync: bool,
    ) -> Option<SendFuture> {
        let Some(client) = self.inner.transports.fetch.clone() else {
            return self.run_fallback(payload, completion);
        };
        let config = &self.inner.config;
        let is_one_ds = config.is_one_ds;
        let batch_len = payload.data.len();

        let mut options = FetchOptions {
            credentials: config.fetch_credentials.or_else(|| {
                (is_one_ds && !config.disable_credentials).then_some(RequestCredentials::Include)
            }),
            ..Default::default()
        };
        // The page may be gone before a keep-alive response arrives.
        let mut ignore_response = false;
        if sync {
            options.keep_alive = true;
            if !is_one_ds {
                ignore_response = true;
            } else if payload.send_reason == Some(SendReason::Unload) {
                ignore_response = true;
                options.no_cors = config.add_no_response;
            }
        }

        let request = match build_request(&payload, !is_one_ds, Some(options)) {
            Ok(request) => request,
            Err(err) => {
                fetch_rejected(completion, is_one_ds, err.to_string());
                return None;
            }
        };

        if sync {
            self.inner
                .sync_fetch_payload
                .fetch_add(batch_len, Ordering::AcqRel);
        }
        let completion = if ignore_response {
            completion.complete(200, HashMap::new(), None);
            None
        } else {
            Some(completion)
        };

        let manager = self.clone();
        let runtime = config.time_wrapper.clone();
        if let (Some(timeout), None, true) = (payload.timeout, &runtime, completion.is_some()) {
            self.inner.handlers.warn(&format!(
                "fetch timeout of {}ms not enforced: no runtime configured",
                timeout.as_millis()
            ));
        }
        Some(Box::pin(async move {
            let response = match (payload.timeout, runtime, completion.is_some()) {
                (Some(timeout), Some(runtime), true) => {
                    match future::select(client.send_bytes(request), runtime.delay(timeout)).await {
                        Either::Left((response, _)) => Some(response),
                        Either::Right(_) => None,
                    }
                }
                _ => Some(client.send_bytes(request).await),
            };
            if sync {
                manager.release_keep_alive(batch_len);
            }
            let Some(completion) = completion else {
                return;
            };
            match response {
                Some(Ok(response)) => manager.fetch_response(&response, completion, &payload),
                Some(Err(err)) => fetch_rejected(completion, is_one_ds, err.to_string()),
                None => {
                    otel_debug!(name: "Sender.FetchTimeout", url = payload.url.clone());
                    completion.complete(500, HashMap::new(), None);
                }
            }
        }))
    }

    fn fetch_response(&self, response: &Response<Bytes>, completion: Completion, payload: &PayloadData) {
        let status = response.status();
        if !self.inner.config.is_one_ds && !status.is_success() {
            let reason = status.canonical_reason().map(str::to_string);
            completion.complete(status.as_u16(), HashMap::new(), reason);
            return;
        }
        if let Some(hook) = &self.inner.config.sender_on_complete_callbacks.fetch_on_complete {
            let on_complete = completion.into_callback();
            invoke_guarded(&*self.inner.handlers, "fetch_on_complete", || {
                hook(response, on_complete, payload)
            });
            return;
        }
        completion.complete(
            status.as_u16(),
            header_map(response.headers()),
            response_text(response.body()),
        );
    }

    fn release_keep_alive(&self, len: usize) {
        let _ = self
            .inner
            .sync_fetch_payload
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_flight| {
                Some(in_flight.saturating_sub(len))
            });
    }
}

/// The request produced no response.
fn fetch_rejected(completion: Completion, is_one_ds: bool, message: String) {
    otel_warn!(name: "Sender.FetchFailed", error = message.clone());
    if is_one_ds {
        completion.complete(0, HashMap::new(), None);
    } else {
        completion.complete(499, HashMap::new(), Some(message));
    }
}
