use super::{build_request, SendFuture, SenderPostManager};
use crate::client::{XhrEvent, XhrRequest};
use crate::completion::Completion;
use crate::payload::PayloadData;
use opentelemetry_web::global::invoke_guarded;
use opentelemetry_web::otel_debug;
use std::collections::HashMap;

impl SenderPostManager {
    /// Sends through the XHR client. Synchronous requests are driven to
    /// completion on the calling thread.
    pub(super) fn xhr_send(
        &self,
        payload: PayloadData,
        completion: Completion,
        sync: bool,
    ) -> Option<SendFuture> {
        let Some(client) = self.inner.transports.xhr.clone() else {
            self.on_no_endpoint(completion, super::NO_TRANSPORT_MESSAGE);
            return None;
        };
        let config = &self.inner.config;
        let is_one_ds = config.is_one_ds;
        let sync = sync && !(is_one_ds && payload.disable_xhr_sync);

        let request = match build_request(&payload, !is_one_ds, None) {
            Ok(request) => request,
            Err(err) => {
                completion.complete(400, HashMap::new(), Some(err.to_string()));
                return None;
            }
        };
        let request = XhrRequest {
            request,
            sync,
            timeout: payload.timeout,
            with_credentials: is_one_ds && !config.disable_credentials,
        };

        let manager = self.clone();
        let send = async move {
            let event = client.send(request).await;
            manager.xhr_done(event, completion, &payload);
        };
        if sync {
            futures_executor::block_on(send);
            None
        } else {
            Some(Box::pin(send))
        }
    }

    fn xhr_done(&self, event: XhrEvent, completion: Completion, payload: &PayloadData) {
        let is_one_ds = self.inner.config.is_one_ds;
        match event {
            XhrEvent::Load(response) => {
                match &self.inner.config.sender_on_complete_callbacks.xhr_on_complete {
                    Some(hook) => {
                        let on_complete = completion.into_callback();
                        invoke_guarded(&*self.inner.handlers, "xhr_on_complete", || {
                            hook(&response, on_complete, payload)
                        });
                    }
                    None => completion.complete(response.status, response.headers, response.body),
                }
            }
            XhrEvent::Error(response) => {
                otel_debug!(name: "Sender.XhrError", status = response.status);
                if is_one_ds {
                    completion.complete(response.status, HashMap::new(), None);
                } else {
                    let message = format!(
                        "XMLHttpRequest,Status:{},Response:{}",
                        response.status,
                        response.body.as_deref().unwrap_or_default()
                    );
                    completion.complete(400, HashMap::new(), Some(message));
                }
            }
            XhrEvent::Timeout(response) => {
                otel_debug!(name: "Sender.XhrTimeout", url = payload.url.clone());
                let status = if is_one_ds { response.status } else { 500 };
                completion.complete(status, HashMap::new(), None);
            }
        }
    }
}
