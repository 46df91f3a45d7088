use futures_executor::block_on;
use opentelemetry_web_sender::client::{XhrEvent, XhrResponse};
use opentelemetry_web_sender::testing::{
    CompletionRecorder, RecordingBeacon, RecordingHttpClient, RecordingXhr, TestCapabilities,
    TestRuntime,
};
use opentelemetry_web_sender::{
    prepare_payload, PayloadBody, PayloadData, SendReason, SenderConfig, SenderPostManager,
    TransportType, Transports,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const URL: &str = "https://dc.example/v2/track";

struct Browser {
    beacon: RecordingBeacon,
    http: RecordingHttpClient,
    xhr: RecordingXhr,
}

impl Browser {
    fn new() -> Self {
        Browser {
            beacon: RecordingBeacon::default(),
            http: RecordingHttpClient::default(),
            xhr: RecordingXhr::default(),
        }
    }

    fn manager(&self, config: SenderConfig) -> SenderPostManager {
        SenderPostManager::with_capabilities(
            config,
            Transports::new()
                .with_beacon(self.beacon.clone())
                .with_fetch(self.http.clone())
                .with_xhr(self.xhr.clone()),
            Arc::new(TestCapabilities::all()),
        )
    }
}

#[test]
fn prepare_payload_without_zip_is_synchronous_passthrough() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let task = prepare_payload(
        move |payload| *sink.lock().unwrap() = Some(payload),
        false,
        PayloadData::new("u", "d"),
        false,
    );

    assert!(task.is_none());
    let payload = seen.lock().unwrap().take().expect("callback ran synchronously");
    assert_eq!(payload.data, PayloadBody::Text("d".to_string()));
    assert!(!payload.headers.contains_key("Content-Encoding"));
}

#[test]
fn refused_beacon_falls_back_to_synchronous_xhr() {
    let browser = Browser::new();
    browser.beacon.set_refuse(true);
    let manager = browser.manager(SenderConfig::default());
    let recorder = CompletionRecorder::default();

    let instance = manager
        .get_sender_inst(&[TransportType::Beacon, TransportType::Fetch], false)
        .unwrap();
    assert_eq!(instance.transport(), TransportType::Beacon);
    let future = instance.send(PayloadData::new(URL, "[]"), recorder.callback());

    assert!(future.is_none());
    assert_eq!(browser.beacon.attempts(), 1);
    let xhr = browser.xhr.requests();
    assert_eq!(xhr.len(), 1);
    assert!(xhr[0].sync);
    assert!(browser.http.requests().is_empty());
    assert_eq!(recorder.statuses(), vec![200]);
}

#[cfg(feature = "gzip")]
#[test]
fn compressed_payload_is_sent_with_fetch() {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let browser = Browser::new();
    let manager = browser.manager(
        SenderConfig::builder()
            .with_runtime(TestRuntime::default())
            .with_enable_send_promise(true)
            .build(),
    );
    let text = r#"[{"name":"PageView","time":"2024-01-01T00:00:00Z"}]"#.repeat(64);
    let recorder = CompletionRecorder::default();
    let sends = Arc::new(Mutex::new(Vec::new()));

    let sender = manager.clone();
    let pending = sends.clone();
    let callback = recorder.callback();
    let task = manager
        .prepare_payload(
            move |payload| {
                let future = sender.send(&[TransportType::Fetch], payload, callback, false);
                pending.lock().unwrap().extend(future);
            },
            true,
            PayloadData::new(URL, text.clone()),
            false,
        )
        .expect("compression runs asynchronously");
    block_on(task);
    for future in sends.lock().unwrap().drain(..) {
        block_on(future);
    }

    assert_eq!(recorder.statuses(), vec![200]);
    let request = &browser.http.requests()[0];
    assert_eq!(request.headers.get("content-encoding").map(String::as_str), Some("gzip"));
    let mut decoded = String::new();
    GzDecoder::new(&request.body[..])
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, text);
}

#[test]
fn compression_is_skipped_without_environment_support() {
    let browser = Browser::new();
    let manager = SenderPostManager::with_capabilities(
        SenderConfig::default(),
        Transports::new().with_xhr(browser.xhr.clone()),
        Arc::new(TestCapabilities {
            compression: false,
            ..TestCapabilities::all()
        }),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let task = manager.prepare_payload(
        move |payload| sink.lock().unwrap().push(payload),
        true,
        PayloadData::new(URL, "[]"),
        false,
    );
    assert!(task.is_none());
    assert_eq!(seen.lock().unwrap()[0].data, PayloadBody::Text("[]".to_string()));
}

#[test]
fn every_path_completes_exactly_once() {
    let browser = Browser::new();
    browser.http.push_response(503, "");
    browser.http.push_error("offline");
    browser.xhr.push_event(XhrEvent::Error(XhrResponse::default()));
    browser.xhr.push_event(XhrEvent::Timeout(XhrResponse::default()));
    let manager = browser.manager(SenderConfig::builder().with_enable_send_promise(true).build());

    let cases: Vec<(TransportType, bool, PayloadData)> = vec![
        (TransportType::Beacon, true, PayloadData::new(URL, "[]")),
        (TransportType::Fetch, false, PayloadData::new(URL, "[]")),
        (TransportType::Fetch, false, PayloadData::new(URL, "[]")),
        (TransportType::Fetch, true, PayloadData::new(URL, "[]").with_send_reason(SendReason::Unload)),
        (TransportType::Xhr, true, PayloadData::new(URL, "[]")),
        (TransportType::Xhr, false, PayloadData::new(URL, "[]")),
        (TransportType::Xhr, false, PayloadData::new("", "[]")),
    ];
    let expected = [200, 503, 499, 200, 400, 500, 400];

    for ((transport, sync, payload), status) in cases.into_iter().zip(expected) {
        let recorder = CompletionRecorder::default();
        let future = manager
            .get_sender_inst(&[transport], sync)
            .unwrap()
            .send(payload, recorder.callback());
        if let Some(future) = future {
            block_on(future);
        }
        assert_eq!(recorder.statuses(), vec![status], "{transport:?} sync={sync}");
    }
}

#[test]
fn spawned_sends_time_out() {
    let browser = Browser::new();
    browser.http.hang();
    let runtime = TestRuntime::default();
    let manager = browser.manager(SenderConfig::builder().with_runtime(runtime.clone()).build());
    let recorder = CompletionRecorder::default();

    let future = manager.send(
        &[TransportType::Fetch],
        PayloadData::new(URL, "[]").with_timeout(Duration::from_secs(30)),
        recorder.callback(),
        false,
    );
    assert!(future.is_none());
    assert_eq!(recorder.count(), 0);
    runtime.run_spawned();
    assert_eq!(recorder.statuses(), vec![500]);
}

#[test]
fn teardown_stops_new_sends() {
    let browser = Browser::new();
    let manager = browser.manager(SenderConfig::default());
    manager.teardown();
    let recorder = CompletionRecorder::default();
    manager.send(
        &[TransportType::Beacon, TransportType::Xhr],
        PayloadData::new(URL, "[]"),
        recorder.callback(),
        true,
    );
    assert_eq!(recorder.statuses(), vec![400]);
    assert_eq!(browser.beacon.attempts(), 0);
}
