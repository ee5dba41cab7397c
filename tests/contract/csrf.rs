#[path = "../common/mod.rs"]
mod common;

use std::sync::{Arc, Mutex};

use reqwest::Method;
use resilient_request::{CookieJar, RequestDescriptor, RequestPipeline, StaticCsrfStore};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

#[tokio::test]
async fn csrf_token_rides_only_on_mutating_verbs() {
    let server = MockServer::start().await;
    let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    Mock::given(path("/api/tenants/t-1/members"))
        .respond_with(move |req: &Request| {
            let csrf = req
                .headers
                .get("X-CSRFToken")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string());
            recorder
                .lock()
                .unwrap()
                .push((req.method.as_str().to_string(), csrf));
            ResponseTemplate::new(200).set_body_json(serde_json::json!({}))
        })
        .expect(5)
        .mount(&server)
        .await;

    let pipeline = RequestPipeline::builder(common::config(&server.uri()))
        .csrf_store(Arc::new(StaticCsrfStore::new("csrf-abc")))
        .build()
        .expect("pipeline");

    for verb in [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ] {
        pipeline
            .send(&RequestDescriptor::new(verb, "/api/tenants/t-1/members"))
            .await
            .expect("request succeeds");
    }

    let seen = seen.lock().unwrap().clone();
    for (verb, csrf) in seen {
        if verb == "GET" {
            assert_eq!(csrf, None, "GET must not carry the CSRF token");
        } else {
            assert_eq!(csrf.as_deref(), Some("csrf-abc"), "{} must carry the CSRF token", verb);
        }
    }
}

#[tokio::test]
async fn no_csrf_header_without_a_token() {
    let server = MockServer::start().await;
    Mock::given(path("/api/notes"))
        .respond_with(|req: &Request| {
            assert!(req.headers.get("X-CSRFToken").is_none());
            ResponseTemplate::new(204)
        })
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = RequestPipeline::new(common::config(&server.uri())).expect("pipeline");
    let response = pipeline
        .send(&RequestDescriptor::post("/api/notes").body(r#"{"text":"hi"}"#))
        .await
        .expect("created");
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn double_submit_header_matches_cookie_value() {
    let server = MockServer::start().await;
    let token = "kX9+Qm/2pL==";

    Mock::given(path("/api/login/bootstrap"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", format!("csrftoken={}; Path=/; SameSite=Lax", token).as_str())
                .set_body_json(serde_json::json!({})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/projects"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let jar = Arc::new(CookieJar::new());
    let pipeline = RequestPipeline::builder(common::config(&server.uri()))
        .cookie_jar(jar)
        .build()
        .expect("pipeline");

    pipeline
        .send(&RequestDescriptor::get("/api/login/bootstrap"))
        .await
        .expect("bootstrap");
    pipeline
        .send(&RequestDescriptor::post("/api/projects"))
        .await
        .expect("create");

    let received = server.received_requests().await.unwrap();
    let create = received
        .iter()
        .find(|req| req.url.path() == "/api/projects")
        .expect("create request");
    assert_eq!(
        create.headers.get("X-CSRFToken").unwrap().to_str().unwrap(),
        token
    );
    assert_eq!(
        create.headers.get("cookie").unwrap().to_str().unwrap(),
        format!("csrftoken={}", token)
    );
}

#[tokio::test]
async fn cookies_are_not_sent_to_foreign_hosts() {
    let console = MockServer::start().await;
    let third_party = MockServer::start().await;

    Mock::given(path("/api/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&console)
        .await;
    Mock::given(path("/collect"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&third_party)
        .await;

    let jar = Arc::new(CookieJar::from_cookie_header("session=s-1; csrftoken=c-1"));
    let pipeline = RequestPipeline::builder(common::config(&console.uri()))
        .cookie_jar(jar)
        .build()
        .expect("pipeline");

    pipeline
        .send(&RequestDescriptor::get("/api/me"))
        .await
        .expect("same origin");
    let foreign = format!("http://localhost:{}/collect", third_party.address().port());
    pipeline
        .send(&RequestDescriptor::post(foreign))
        .await
        .expect("foreign host");

    let own = console.received_requests().await.unwrap();
    assert_eq!(
        own[0].headers.get("cookie").unwrap().to_str().unwrap(),
        "csrftoken=c-1; session=s-1"
    );
    let leaked = third_party.received_requests().await.unwrap();
    assert!(leaked[0].headers.get("cookie").is_none());
}
