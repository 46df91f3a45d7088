//! Optional gzip compression of payloads before they are sent.
//!
//! Compression runs as a [`CompressionTask`] future that encodes at most one
//! chunk per poll, so large batches never monopolize the executor.
use crate::payload::{PayloadBody, PayloadData};
use opentelemetry_web::{otel_debug, otel_warn};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Receives the payload once it is ready to send.
pub type PayloadCallback = Box<dyn FnOnce(PayloadData) + Send>;

/// Size of the compressed chunks read per poll.
pub const COMPRESSION_CHUNK_SIZE: usize = 16 * 1024;

const GZIP_AVAILABLE: bool = cfg!(feature = "gzip");

/// Gets `payload` ready for sending and hands it to `callback`.
///
/// The payload is passed through untouched, synchronously, and `None` is
/// returned when `zip` is false, `is_sync` is true, the body is empty, or
/// gzip support is not compiled in (`gzip` feature).
///
/// Otherwise the returned [`CompressionTask`] must be polled to completion
/// (awaited or spawned). It replaces the body with its gzip encoding, adds a
/// `Content-Encoding: gzip` header and then calls `callback`. If encoding
/// fails, or the task is cancelled or dropped before it finishes, `callback`
/// receives the original payload instead, so the send is never lost.
pub fn prepare_payload<F>(
    callback: F,
    zip: bool,
    payload: PayloadData,
    is_sync: bool,
) -> Option<CompressionTask>
where
    F: FnOnce(PayloadData) + Send + 'static,
{
    if !zip || is_sync || payload.data.is_empty() || !GZIP_AVAILABLE {
        callback(payload);
        return None;
    }
    otel_debug!(
        name: "Sender.CompressPayload",
        bytes = payload.data.len()
    );
    Some(CompressionTask::new(Box::new(callback), payload))
}

/// Cancels a [`CompressionTask`] from outside, e.g. when the page unloads.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Stops compressing. The task then delivers the uncompressed payload
    /// the next time it is polled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

struct TaskState {
    callback: PayloadCallback,
    payload: PayloadData,
    #[cfg(feature = "gzip")]
    encoder: flate2::read::GzEncoder<io::Cursor<bytes::Bytes>>,
    buffer: Box<[u8]>,
    output: Vec<u8>,
}

enum Step {
    More,
    Done,
    Failed(io::Error),
}

impl TaskState {
    #[cfg(feature = "gzip")]
    fn step(&mut self) -> Step {
        use std::io::Read;
        match self.encoder.read(&mut self.buffer) {
            Ok(0) => Step::Done,
            Ok(n) => {
                self.output.extend_from_slice(&self.buffer[..n]);
                Step::More
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Step::More,
            Err(err) => Step::Failed(err),
        }
    }

    #[cfg(not(feature = "gzip"))]
    fn step(&mut self) -> Step {
        Step::Failed(io::Error::other("gzip support is not enabled"))
    }

    fn finish(self) {
        let TaskState {
            callback,
            mut payload,
            output,
            ..
        } = self;
        payload.data = PayloadBody::Binary(output.into());
        payload
            .headers
            .insert("Content-Encoding".to_string(), "gzip".to_string());
        callback(payload);
    }

    fn fall_back(self) {
        (self.callback)(self.payload);
    }
}

/// Future compressing one payload. Created by [`prepare_payload`].
pub struct CompressionTask {
    state: Option<TaskState>,
    cancelled: Arc<AtomicBool>,
}

impl CompressionTask {
    fn new(callback: PayloadCallback, payload: PayloadData) -> Self {
        #[cfg(feature = "gzip")]
        let encoder = flate2::read::GzEncoder::new(
            io::Cursor::new(payload.data.to_bytes()),
            flate2::Compression::default(),
        );
        CompressionTask {
            state: Some(TaskState {
                callback,
                payload,
                #[cfg(feature = "gzip")]
                encoder,
                buffer: vec![0; COMPRESSION_CHUNK_SIZE].into_boxed_slice(),
                output: Vec::new(),
            }),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that cancels this task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }
}

impl Future for CompressionTask {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.cancelled.load(Ordering::Acquire) {
            if let Some(state) = self.state.take() {
                otel_debug!(name: "Sender.CompressionCancelled");
                state.fall_back();
            }
            return Poll::Ready(());
        }
        let Some(state) = self.state.as_mut() else {
            return Poll::Ready(());
        };
        match state.step() {
            Step::More => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Step::Done => {
                if let Some(state) = self.state.take() {
                    state.finish();
                }
                Poll::Ready(())
            }
            Step::Failed(err) => {
                otel_warn!(
                    name: "Sender.CompressionFailed",
                    error = err.to_string(),
                    message = "sending the payload uncompressed"
                );
                if let Some(state) = self.state.take() {
                    state.fall_back();
                }
                Poll::Ready(())
            }
        }
    }
}

impl Drop for CompressionTask {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            otel_debug!(name: "Sender.CompressionAbandoned");
            state.fall_back();
        }
    }
}

impl fmt::Debug for CompressionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionTask")
            .field("done", &self.state.is_none())
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, feature = "gzip"))]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use futures_executor::block_on;
    use futures_util::task::noop_waker_ref;
    use futures_util::FutureExt;
    use std::io::Read;
    use std::sync::Mutex;

    fn capture() -> (
        impl FnOnce(PayloadData) + Send + 'static,
        Arc<Mutex<Vec<PayloadData>>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (move |payload| sink.lock().unwrap().push(payload), seen)
    }

    fn gunzip(body: &PayloadBody) -> String {
        let PayloadBody::Binary(bytes) = body else {
            panic!("expected a binary body, got {body:?}");
        };
        let mut text = String::new();
        GzDecoder::new(&bytes[..]).read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn passthrough_without_zip() {
        let (callback, seen) = capture();
        let task = prepare_payload(callback, false, PayloadData::new("u", "d"), false);
        assert!(task.is_none());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, PayloadBody::Text("d".to_string()));
        assert!(!seen[0].headers.contains_key("Content-Encoding"));
    }

    #[test]
    fn passthrough_for_sync_and_empty() {
        let (callback, seen) = capture();
        assert!(prepare_payload(callback, true, PayloadData::new("u", "d"), true).is_none());
        let (callback, _) = capture();
        assert!(prepare_payload(callback, true, PayloadData::new("u", ""), false).is_none());
        assert_eq!(seen.lock().unwrap()[0].data, PayloadBody::Text("d".to_string()));
    }

    #[test]
    fn compresses_and_round_trips() {
        let text = r#"[{"name":"Microsoft.ApplicationInsights.Event","data":{"baseType":"EventData"}}]"#;
        let (callback, seen) = capture();
        let task = prepare_payload(callback, true, PayloadData::new("u", text), false)
            .expect("compression should start");
        assert!(seen.lock().unwrap().is_empty());

        block_on(task);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].headers.get("Content-Encoding").map(String::as_str), Some("gzip"));
        assert_eq!(gunzip(&seen[0].data), text);
    }

    #[test]
    fn large_payload_spans_many_chunks() {
        let text: String = (0..200_000u32).map(|i| format!("{:08x}", i.wrapping_mul(2654435761))).collect();
        let (callback, seen) = capture();
        block_on(prepare_payload(callback, true, PayloadData::new("u", text.clone()), false).unwrap());

        let seen = seen.lock().unwrap();
        assert!(seen[0].data.len() > COMPRESSION_CHUNK_SIZE);
        assert_eq!(gunzip(&seen[0].data), text);
    }

    #[test]
    fn cancelled_task_sends_original() {
        let (callback, seen) = capture();
        let task = prepare_payload(callback, true, PayloadData::new("u", "payload"), false).unwrap();
        task.cancel_handle().cancel();
        block_on(task);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, PayloadBody::Text("payload".to_string()));
        assert!(seen[0].headers.is_empty());
    }

    #[test]
    fn cancelled_then_dropped_task_sends_original_once() {
        let (callback, seen) = capture();
        let task = prepare_payload(callback, true, PayloadData::new("u", "payload"), false).unwrap();
        task.cancel_handle().cancel();
        drop(task);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, PayloadBody::Text("payload".to_string()));
    }

    #[test]
    fn task_dropped_mid_compression_sends_original_once() {
        let text: String = (0..200_000u32).map(|i| format!("{:08x}", i.wrapping_mul(2654435761))).collect();
        let (callback, seen) = capture();
        let mut task = prepare_payload(callback, true, PayloadData::new("u", text.clone()), false).unwrap();
        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(task.poll_unpin(&mut cx).is_pending());
        assert!(seen.lock().unwrap().is_empty());
        drop(task);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, PayloadBody::Text(text));
        assert!(seen[0].headers.is_empty());
    }

    #[test]
    fn completed_task_does_not_call_back_again_on_drop() {
        let (callback, seen) = capture();
        let mut task = prepare_payload(callback, true, PayloadData::new("u", "payload"), false).unwrap();
        block_on(&mut task);
        drop(task);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
