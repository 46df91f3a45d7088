use super::{SendFuture, SenderPostManager};
use crate::completion::Completion;
use crate::payload::PayloadData;
use opentelemetry_web::global::invoke_guarded;
use opentelemetry_web::{otel_debug, otel_warn};
use std::collections::HashMap;

impl SenderPostManager {
    /// Queues the payload with the beacon client.
    ///
    /// A refused beacon is handed to the `beacon_on_retry` hook if one is
    /// configured, and otherwise resent synchronously with the fallback
    /// transport.
    pub(super) fn beacon_send(
        &self,
        payload: PayloadData,
        completion: Completion,
    ) -> Option<SendFuture> {
        let Some(client) = self.inner.transports.beacon.clone() else {
            return self.run_fallback(payload, completion);
        };
        if client.send_beacon(&payload.url, payload.data.to_bytes()) {
            completion.complete(200, HashMap::new(), None);
            return None;
        }

        let callbacks = &self.inner.config.sender_on_complete_callbacks;
        if let Some(on_retry) = callbacks.beacon_on_retry.clone() {
            otel_debug!(name: "Sender.BeaconRetryHook", url = payload.url.clone());
            let can_send = |retry: &PayloadData| client.send_beacon(&retry.url, retry.data.to_bytes());
            let on_complete = completion.into_callback();
            invoke_guarded(&*self.inner.handlers, "beacon_on_retry", || {
                on_retry(&payload, on_complete, &can_send)
            });
            return None;
        }

        otel_warn!(
            name: "Sender.BeaconFallback",
            url = payload.url.clone(),
            bytes = payload.data.len(),
            message = "beacon was refused, retrying with the fallback transport"
        );
        self.run_fallback(payload, completion)
    }
}
