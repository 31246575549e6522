// Router-level tests: checkout, confirmation and the paid analyze endpoint,
// with the Solana RPC node and the Gemini API mocked.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use mockito::Matcher;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tower::ServiceExt;

use plot_hole::config::{Config, Secrets};
use plot_hole::{create_router, AppState};

const MERCHANT: &str = "11111111111111111111111111111112";
const BOUNDARY: &str = "plotholeboundary";

fn config(rpc_url: &str, gemini_url: &str) -> Config {
    let secrets = Secrets::from_toml_str(&format!(
        r#"
[solana]
merchant_wallet = "{MERCHANT}"
api_url = "{rpc_url}"

[api_keys]
google_api_key = "test-key"
"#
    ))
    .unwrap();
    let mut config = Config::from_secrets(secrets).unwrap();
    config.llm.api_base = gemini_url.to_string();
    config.llm.model = "gemini-test".to_string();
    config.payment.confirm_attempts = 2;
    config.payment.confirm_interval = Duration::from_millis(10);
    config
}

fn app(rpc_url: &str, gemini_url: &str) -> Router {
    app_with(config(rpc_url, gemini_url))
}

fn app_with(config: Config) -> Router {
    create_router(AppState::from_config(config).unwrap())
}

fn slow_confirm_config(rpc_url: &str) -> Config {
    let mut config = config(rpc_url, "http://localhost:1");
    config.payment.confirm_attempts = 2;
    config.payment.confirm_interval = Duration::from_millis(300);
    config
}

fn demo_wallet_config(rpc_url: &str) -> Config {
    let mut config = config(rpc_url, "http://localhost:1");
    config.solana.customer_private_key = Some("11".repeat(32));
    config
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn analyze_request(session_id: &str, filename: &str, file: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{session_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/screenplay/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn screenplay_pdf(line: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(line)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

async fn request_payment(app: &Router) -> Value {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/api/payment/request")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn mock_paid_reference(server: &mut mockito::ServerGuard, reference: &str) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignaturesForAddress" })))
        .with_status(200)
        .with_body(
            json!({ "jsonrpc": "2.0", "id": 1, "result": [{ "signature": "5paid", "slot": 7 }] })
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getTransaction" })))
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {
                    "slot": 7,
                    "blockTime": 1_700_000_000,
                    "meta": {
                        "err": null,
                        "preBalances": [5_000_000_000u64, 0, 0, 1],
                        "postBalances": [4_998_995_000u64, 1_000_000, 0, 1]
                    },
                    "transaction": {
                        "signatures": ["5paid"],
                        "message": {
                            "accountKeys": [
                                "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T",
                                MERCHANT,
                                reference,
                                "11111111111111111111111111111111"
                            ]
                        }
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
}

async fn session_view(app: &Router, session_id: &str) -> Value {
    let (status, view) = send(
        app,
        Request::builder()
            .uri(format!("/api/payment/{session_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    view
}

async fn confirm(app: &Router, session_id: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json("/api/payment/confirm", json!({ "session_id": session_id })),
    )
    .await
}

/// A session whose payment has been confirmed against `rpc`.
async fn paid_session(app: &Router, rpc: &mut mockito::ServerGuard) -> String {
    let session = request_payment(app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();
    mock_paid_reference(rpc, session["reference"].as_str().unwrap()).await;
    let (status, body) = confirm(app, &session_id).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    session_id
}

async fn mock_no_signatures(server: &mut mockito::ServerGuard) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignaturesForAddress" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": [] }).to_string())
        .create_async()
        .await;
}

async fn mock_blockhash(server: &mut mockito::ServerGuard) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getLatestBlockhash" })))
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "context": { "slot": 1 },
                    "value": {
                        "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                        "lastValidBlockHeight": 100
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
}

async fn mock_gemini(server: &mut mockito::ServerGuard, body: Value) -> mockito::Mock {
    server
        .mock("POST", Matcher::Regex("gemini-test:generateContent$".to_string()))
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn test_health_and_index() {
    let app = app("http://localhost:1", "http://localhost:1");

    let (status, body) = send(
        &app,
        Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llm_provider"], "google");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&page).contains("Analyze screenplay"));
}

#[tokio::test]
async fn test_payment_request_returns_uri_and_qr() {
    let app = app("http://localhost:1", "http://localhost:1");
    let body = request_payment(&app).await;

    let url = body["payment_url"].as_str().unwrap();
    assert!(url.starts_with(&format!("solana:{MERCHANT}?amount=0.001")));
    assert!(url.contains(&format!("reference={}", body["reference"].as_str().unwrap())));
    assert!(body["qr_svg"].as_str().unwrap().contains("<svg"));
    assert_eq!(body["customer_wallet_configured"], false);

    let session_id = body["session_id"].as_str().unwrap();
    let (status, view) = send(
        &app,
        Request::builder()
            .uri(format!("/api/payment/{session_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"]["state"], "requested");
}

#[tokio::test]
async fn test_unknown_session() {
    let app = app("http://localhost:1", "http://localhost:1");
    let (status, body) = send(
        &app,
        post_json(
            "/api/payment/confirm",
            json!({ "session_id": "00000000-0000-4000-8000-000000000000" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_analyze_requires_confirmed_payment() {
    let app = app("http://localhost:1", "http://localhost:1");
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        analyze_request(session_id, "draft.pdf", &screenplay_pdf("FADE IN:")),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_REQUIRED");
}

#[tokio::test]
async fn test_confirm_times_out_when_nothing_is_paid() {
    let mut rpc = mockito::Server::new_async().await;
    rpc.mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignaturesForAddress" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": [] }).to_string())
        .expect(2)
        .create_async()
        .await;

    let app = app(&rpc.url(), "http://localhost:1");
    let session = request_payment(&app).await;
    let (status, body) = send(
        &app,
        post_json("/api/payment/confirm", json!({ "session_id": session["session_id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["code"], "PAYMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_paid_checkout_gets_a_critique() {
    let mut rpc = mockito::Server::new_async().await;
    let mut gemini = mockito::Server::new_async().await;
    let generate = gemini
        .mock("POST", Matcher::Regex("gemini-test:generateContent$".to_string()))
        .match_header("x-goog-api-key", "test-key")
        .match_body(Matcher::Regex("INT. LIGHTHOUSE - NIGHT".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "## Plot holes\n\nThe keeper never leaves." }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": { "promptTokenCount": 120, "candidatesTokenCount": 30, "totalTokenCount": 150 }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let app = app(&rpc.url(), &gemini.url());
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();
    mock_paid_reference(&mut rpc, session["reference"].as_str().unwrap()).await;

    let (status, confirmed) = send(
        &app,
        post_json("/api/payment/confirm", json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{confirmed}");
    assert_eq!(confirmed["signature"], "5paid");

    let (status, again) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["signature"], "5paid");
    assert!(again["message"].as_str().unwrap().contains("already confirmed"));

    let (status, analysis) = send(
        &app,
        analyze_request(&session_id, "lighthouse.pdf", &screenplay_pdf("INT. LIGHTHOUSE - NIGHT")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{analysis}");
    assert_eq!(analysis["pages"], 1);
    assert_eq!(analysis["outcome"]["status"], "completed");
    assert!(analysis["outcome"]["html"]
        .as_str()
        .unwrap()
        .contains("<h2>Plot holes</h2>"));
    generate.assert_async().await;

    let (_, view) = send(
        &app,
        Request::builder()
            .uri(format!("/api/payment/{session_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(view["status"]["state"], "confirmed");
    assert_eq!(view["analyses"], 1);
}

#[tokio::test]
async fn test_non_pdf_upload_is_rejected() {
    let mut rpc = mockito::Server::new_async().await;
    let app = app(&rpc.url(), "http://localhost:1");
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();
    mock_paid_reference(&mut rpc, session["reference"].as_str().unwrap()).await;

    let (status, _) = send(
        &app,
        post_json("/api/payment/confirm", json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, analyze_request(&session_id, "notes.pdf", b"FADE IN:")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not a valid PDF"));
}

#[tokio::test]
async fn test_dropped_confirm_releases_the_session() {
    let mut rpc = mockito::Server::new_async().await;
    mock_no_signatures(&mut rpc).await;
    let app = app_with(slow_confirm_config(&rpc.url()));
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let request = post_json("/api/payment/confirm", json!({ "session_id": session_id }));
    let abandoned = timeout(Duration::from_millis(50), app.clone().oneshot(request)).await;
    assert!(abandoned.is_err());

    // Longer than the whole poll loop.
    sleep(Duration::from_millis(900)).await;
    let (status, body) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT, "{body}");
    assert_eq!(body["code"], "PAYMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_concurrent_confirm_is_refused() {
    let mut rpc = mockito::Server::new_async().await;
    mock_no_signatures(&mut rpc).await;
    let app = app_with(slow_confirm_config(&rpc.url()));
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let first = tokio::spawn({
        let app = app.clone();
        let session_id = session_id.clone();
        async move { confirm(&app, &session_id).await }
    });
    sleep(Duration::from_millis(50)).await;

    let (status, body) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already in progress"));

    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_demo_wallet_pays_and_confirms_once() {
    let mut rpc = mockito::Server::new_async().await;
    mock_blockhash(&mut rpc).await;
    let send_tx = rpc
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "sendTransaction" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 2, "result": "5paid" }).to_string())
        .expect(1)
        .create_async()
        .await;

    let app = app_with(demo_wallet_config(&rpc.url()));
    let session = request_payment(&app).await;
    assert_eq!(session["customer_wallet_configured"], true);
    let session_id = session["session_id"].as_str().unwrap().to_string();
    mock_paid_reference(&mut rpc, session["reference"].as_str().unwrap()).await;

    let (status, body) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["signature"], "5paid");

    let (status, _) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::OK);
    send_tx.assert_async().await;
}

#[tokio::test]
async fn test_pending_demo_payment_is_not_sent_twice() {
    let mut rpc = mockito::Server::new_async().await;
    mock_blockhash(&mut rpc).await;
    mock_no_signatures(&mut rpc).await;
    let send_tx = rpc
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "sendTransaction" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 2, "result": "5pending" }).to_string())
        .expect(1)
        .create_async()
        .await;
    rpc.mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getTransaction" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 3, "result": null }).to_string())
        .create_async()
        .await;

    let app = app_with(demo_wallet_config(&rpc.url()));
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let (status, _) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    let view = session_view(&app, &session_id).await;
    assert_eq!(view["status"]["state"], "submitted");
    assert_eq!(view["status"]["signature"], "5pending");

    let (status, _) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    send_tx.assert_async().await;
}

#[tokio::test]
async fn test_failed_demo_payment_is_sent_again() {
    let mut rpc = mockito::Server::new_async().await;
    mock_blockhash(&mut rpc).await;
    rpc.mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignaturesForAddress" })))
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [{ "signature": "5failed", "slot": 3, "err": { "InstructionError": [0, { "Custom": 1 }] } }]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let send_tx = rpc
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "sendTransaction" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 2, "result": "5failed" }).to_string())
        .expect(2)
        .create_async()
        .await;
    rpc.mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getTransaction" })))
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "result": {
                    "slot": 3,
                    "meta": {
                        "err": { "InstructionError": [0, { "Custom": 1 }] },
                        "preBalances": [5_000_000_000u64, 0, 0, 1],
                        "postBalances": [4_999_995_000u64, 0, 0, 1]
                    },
                    "transaction": { "signatures": ["5failed"], "message": { "accountKeys": [] } }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let app = app_with(demo_wallet_config(&rpc.url()));
    let session = request_payment(&app).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let (status, _) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    let (status, _) = confirm(&app, &session_id).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    send_tx.assert_async().await;
}

#[tokio::test]
async fn test_blocked_critique_is_reported_and_not_counted() {
    let mut rpc = mockito::Server::new_async().await;
    let mut gemini = mockito::Server::new_async().await;
    mock_gemini(
        &mut gemini,
        json!({ "promptFeedback": { "blockReason": "SAFETY" } }),
    )
    .await;

    let app = app(&rpc.url(), &gemini.url());
    let session_id = paid_session(&app, &mut rpc).await;

    let (status, analysis) = send(
        &app,
        analyze_request(&session_id, "heist.pdf", &screenplay_pdf("INT. BANK - DAY")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{analysis}");
    assert_eq!(analysis["outcome"]["status"], "blocked");
    assert_eq!(analysis["outcome"]["reason"], "SAFETY");
    assert!(analysis["notice"].as_str().unwrap().contains("SAFETY"));

    let view = session_view(&app, &session_id).await;
    assert_eq!(view["analyses"], 0);
}

#[tokio::test]
async fn test_empty_critique_is_reported() {
    let mut rpc = mockito::Server::new_async().await;
    let mut gemini = mockito::Server::new_async().await;
    mock_gemini(&mut gemini, json!({ "candidates": [] })).await;

    let app = app(&rpc.url(), &gemini.url());
    let session_id = paid_session(&app, &mut rpc).await;

    let (status, analysis) = send(
        &app,
        analyze_request(&session_id, "heist.pdf", &screenplay_pdf("INT. BANK - DAY")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{analysis}");
    assert_eq!(analysis["outcome"]["status"], "empty");
    assert!(analysis["notice"].as_str().unwrap().contains("empty"));

    let view = session_view(&app, &session_id).await;
    assert_eq!(view["analyses"], 0);
}
