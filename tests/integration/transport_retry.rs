#[path = "../common/mod.rs"]
mod common;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use resilient_request::{Error, RequestDescriptor, RequestPipeline, TransportKind};

#[tokio::test]
async fn refused_connections_exhaust_the_retry_budget() {
    let pipeline = RequestPipeline::new(common::config(&common::closed_port_uri())).expect("pipeline");

    let (lines, guard) = common::capture_logs();
    let err = pipeline
        .send(&RequestDescriptor::get("/api/health"))
        .await
        .expect_err("nothing is listening");
    drop(guard);

    match err {
        Error::MaxRetriesExceeded { attempts, source } => {
            assert_eq!(attempts, 4);
            match *source {
                Error::Transport(failure) => assert_eq!(failure.kind, TransportKind::Connect),
                other => panic!("expected transport failure, got {}", other),
            }
        }
        other => panic!("expected Error::MaxRetriesExceeded, got {}", other),
    }

    let logs = lines.lock().unwrap().clone();
    let scheduled = logs
        .iter()
        .filter(|line| line.contains("WARN") && line.contains("retry.scheduling"))
        .count();
    assert_eq!(scheduled, 3, "expected three backoff warnings, got {:?}", logs);
}

#[tokio::test]
async fn per_request_budget_overrides_default() {
    let pipeline = RequestPipeline::new(common::config(&common::closed_port_uri())).expect("pipeline");

    let err = pipeline
        .send(&RequestDescriptor::post("/api/events").max_retries(1))
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, Error::MaxRetriesExceeded { attempts: 2, .. }));

    let err = pipeline
        .send(&RequestDescriptor::get("/api/events").max_retries(0))
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, Error::MaxRetriesExceeded { attempts: 1, .. }));
}

/// Serves one response whose body is cut short, then one complete response.
fn flaky_body_server() -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let uri = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = thread::spawn(move || {
        let replies = [
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 64\r\n\r\n{\"par",
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"ok\":true}",
        ];
        for reply in replies {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            stream.write_all(reply.as_bytes()).expect("write");
            stream.flush().ok();
        }
    });
    (uri, handle)
}

#[tokio::test]
async fn truncated_response_body_is_retried() {
    let (uri, server) = flaky_body_server();
    let pipeline = RequestPipeline::new(common::config(&uri)).expect("pipeline");

    let (lines, guard) = common::capture_logs();
    let response = pipeline
        .send(&RequestDescriptor::get("/api/reports/latest"))
        .await
        .expect("second exchange completes");
    drop(guard);
    server.join().expect("server thread");

    assert_eq!(response.attempts(), 2);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body, serde_json::json!({"ok": true}));

    let logs = lines.lock().unwrap().clone();
    let scheduled = logs
        .iter()
        .filter(|line| line.contains("retry.scheduling"))
        .count();
    assert_eq!(scheduled, 1, "expected one backoff warning, got {:?}", logs);
}
