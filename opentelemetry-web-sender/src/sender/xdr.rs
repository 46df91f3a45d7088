use super::{SendFuture, SenderPostManager};
use crate::client::{XdrEvent, XdrRequest};
use crate::completion::Completion;
use crate::payload::PayloadData;
use opentelemetry_web::global::invoke_guarded;
use opentelemetry_web::otel_debug;
use std::collections::HashMap;

const PROTOCOL_MISMATCH: &str = "Cannot send XDomain request. The endpoint URL protocol doesn't match the hosting page protocol.";

impl SenderPostManager {
    /// Sends through the legacy cross-domain request object. Always
    /// completes before returning.
    pub(super) fn xdr_send(&self, payload: PayloadData, completion: Completion) -> Option<SendFuture> {
        let Some(client) = self.inner.transports.xdr.clone() else {
            self.on_no_endpoint(completion, super::NO_TRANSPORT_MESSAGE);
            return None;
        };
        let is_one_ds = self.inner.config.is_one_ds;

        let url = if is_one_ds {
            payload.url.clone()
        } else {
            // XDR can only reach endpoints on the page's own protocol.
            if let Some(page_protocol) = self.inner.caps.page_protocol() {
                if !payload.url.starts_with(&page_protocol) {
                    otel_debug!(
                        name: "Sender.XdrProtocolMismatch",
                        url = payload.url.clone(),
                        page_protocol = page_protocol
                    );
                    self.inner.handlers.warn(PROTOCOL_MISMATCH);
                    completion.complete(400, HashMap::new(), Some(PROTOCOL_MISMATCH.to_string()));
                    return None;
                }
            }
            strip_http_protocol(&payload.url).to_string()
        };

        let event = client.send(XdrRequest {
            url,
            body: payload.data.to_text(),
            timeout: payload.timeout,
        });
        match event {
            XdrEvent::Load(text) => match &self.inner.config.sender_on_complete_callbacks.xdr_on_complete {
                Some(hook) => {
                    let on_complete = completion.into_callback();
                    invoke_guarded(&*self.inner.handlers, "xdr_on_complete", || {
                        hook(text.as_deref(), on_complete, &payload)
                    });
                }
                None => completion.complete(200, HashMap::new(), text),
            },
            XdrEvent::Error(text) => completion.complete(400, HashMap::new(), text),
            XdrEvent::Timeout => completion.complete(500, HashMap::new(), None),
        }
        None
    }
}

/// Makes the URL protocol-relative so the request follows the page protocol.
fn strip_http_protocol(url: &str) -> &str {
    url.strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"))
        .unwrap_or(url)
}
