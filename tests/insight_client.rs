// Integration tests against a local stand-in for the Gemini endpoint

use pngsync::services::insight::{EMPTY_RESPONSE_INSIGHT, FAILURE_INSIGHT, INSIGHT_PROMPT};
use pngsync::{
    BatchOrchestrator, Converter, GeminiInsightClient, ImageQueue, InsightConfig, InsightError,
    InsightProvider, Metrics, SourceFile, StatusKind,
};
use std::io::{Cursor, Read};
use std::sync::mpsc;
use std::sync::Arc;
use tiny_http::{Response, Server};

/// A request as the fake server saw it
struct Captured {
    url: String,
    api_key: Option<String>,
    body: serde_json::Value,
}

/// Serve `responses` in order, one per request, then stop.
///
/// Returns the base URL and a channel yielding each captured request.
fn start_fake_gemini(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        for (status, body) in responses {
            let mut request = match server.recv() {
                Ok(request) => request,
                Err(_) => return,
            };

            let mut raw = String::new();
            let _ = request.as_reader().read_to_string(&mut raw);
            let api_key = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("x-goog-api-key"))
                .map(|h| h.value.as_str().to_string());
            let _ = tx.send(Captured {
                url: request.url().to_string(),
                api_key,
                body: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            });

            let response = Response::from_string(body).with_status_code(status).with_header(
                "Content-Type: application/json"
                    .parse::<tiny_http::Header>()
                    .unwrap(),
            );
            let _ = request.respond(response);
        }
    });

    (format!("http://{}/v1beta", addr), rx)
}

fn client(base_url: &str, metrics: &Metrics) -> GeminiInsightClient {
    let config = InsightConfig::new("test-key").with_base_url(base_url);
    GeminiInsightClient::new(config, Some(metrics.clone())).unwrap()
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

const MODEL_REPLY: &str = r#"{
  "candidates": [{
    "content": {
      "role": "model",
      "parts": [{"text": "Line art like this keeps crisp edges as PNG. Lossless storage avoids JPEG ringing."}]
    },
    "finishReason": "STOP"
  }]
}"#;

#[tokio::test]
async fn test_model_text_returned_verbatim() {
    let (base_url, requests) = start_fake_gemini(vec![(200, MODEL_REPLY)]);
    let metrics = Metrics::new();
    let client = client(&base_url, &metrics);

    let text = client
        .get_insight("data:image/jpeg;base64,QUJD", "sketch.jpg")
        .await;

    assert_eq!(
        text,
        "Line art like this keeps crisp edges as PNG. Lossless storage avoids JPEG ringing."
    );

    let captured = requests.recv().unwrap();
    assert_eq!(
        captured.url,
        "/v1beta/models/gemini-3-flash-preview:generateContent"
    );
    assert_eq!(captured.api_key.as_deref(), Some("test-key"));

    let parts = &captured.body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], INSIGHT_PROMPT);
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    assert_eq!(parts[1]["inline_data"]["data"], "QUJD");

    assert_eq!(metrics.snapshot().insight_model, 1);
}

#[tokio::test]
async fn test_empty_candidates_use_default_sentence() {
    let (base_url, _requests) = start_fake_gemini(vec![(200, r#"{"candidates": []}"#)]);
    let metrics = Metrics::new();
    let client = client(&base_url, &metrics);

    let text = client.get_insight("QUJD", "empty.jpg").await;

    assert_eq!(text, EMPTY_RESPONSE_INSIGHT);
    assert_eq!(metrics.snapshot().insight_empty_fallback, 1);
}

#[tokio::test]
async fn test_error_status_uses_failure_sentence() {
    const DENIED: &str = r#"{"error": {"code": 401, "message": "API key not valid"}}"#;
    let (base_url, _requests) = start_fake_gemini(vec![(401, DENIED), (401, DENIED)]);
    let metrics = Metrics::new();
    let client = client(&base_url, &metrics);

    assert!(matches!(
        client.request_insight("QUJD").await,
        Err(InsightError::Status { status: 401, .. })
    ));
    let text = client.get_insight("QUJD", "denied.jpg").await;

    assert_eq!(text, FAILURE_INSIGHT);
    assert_eq!(metrics.snapshot().insight_error_fallback, 1);
}

#[tokio::test]
async fn test_malformed_body_uses_failure_sentence() {
    let (base_url, _requests) = start_fake_gemini(vec![(200, "not json")]);
    let client = client(&base_url, &Metrics::new());

    assert_eq!(client.get_insight("QUJD", "odd.jpg").await, FAILURE_INSIGHT);
}

#[tokio::test]
async fn test_batch_against_fake_service() {
    let (base_url, requests) = start_fake_gemini(vec![(200, MODEL_REPLY), (500, "oops")]);
    let metrics = Metrics::new();

    let mut queue = ImageQueue::new();
    let ids = queue.ingest(vec![
        SourceFile::new("first.jpg", jpeg(8, 6)),
        SourceFile::new("broken.jpg", vec![0xFF, 0xD8, 0xFF, 0x00]),
        SourceFile::new("second.jpg", jpeg(5, 5)),
    ]);
    let queue = queue.into_shared();

    let orchestrator = BatchOrchestrator::new(
        Arc::clone(&queue),
        Converter::new(client(&base_url, &metrics), Some(metrics.clone())),
        Some(metrics.clone()),
    );
    let report = orchestrator.process_all().await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        report
            .results
            .iter()
            .map(|r| r.filename.as_str())
            .collect::<Vec<_>>(),
        vec!["first.jpg", "broken.jpg", "second.jpg"]
    );

    let queue = queue.read();
    let first = queue.get(&ids[0]).unwrap();
    assert_eq!(first.status().kind(), StatusKind::Completed);
    assert!(first.insight().unwrap().starts_with("Line art"));
    assert_eq!(first.conversion().unwrap().dimensions(), (8, 6));

    assert_eq!(queue.get(&ids[1]).unwrap().status().kind(), StatusKind::Error);

    let second = queue.get(&ids[2]).unwrap();
    assert_eq!(second.insight(), Some(FAILURE_INSIGHT));

    // The undecodable image never reaches the insight service
    assert_eq!(requests.try_iter().count(), 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.conversions_completed, 2);
    assert_eq!(snapshot.conversions_failed, 1);
    assert_eq!(snapshot.batches_processed, 1);
}
