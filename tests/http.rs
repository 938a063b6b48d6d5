//! HTTP adapter over a pipeline with in-process fakes.

mod common;

use common::{harness, VIDEO};
use serde_json::{json, Value};
use tubeqa::cli::commands::router;

async fn serve() -> (String, common::Harness) {
    let h = harness();
    let app = router(h.pipeline.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), h)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_process_topics_and_search_over_http() {
    let (base, h) = serve().await;
    let client = client();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let processed: Value = client
        .post(format!("{}/process", base))
        .json(&json!({ "url": "https://youtu.be/dQw4w9WgXcQ" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(processed["video_id"], VIDEO);
    assert_eq!(processed["num_segments"], 36);
    assert_eq!(processed["segments"].as_array().unwrap().len(), 36);

    let topics: Value = client
        .get(format!("{}/topics/{}", base, VIDEO))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let topics = topics.as_array().unwrap();
    assert!(!topics.is_empty());
    let segment_total: usize = topics
        .iter()
        .map(|t| t["segments"].as_array().unwrap().len())
        .sum();
    assert_eq!(segment_total, 36);

    let answer: Value = client
        .post(format!("{}/search", base))
        .json(&json!({
            "query": "what do cats do?",
            "video_id": VIDEO,
            "conversation_history": [
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["answer"], "answer to: what do cats do?");

    let seen = h.completer.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1.len(), 1);
    assert_eq!(seen[0].1[0].question, "hi");
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let (base, _h) = serve().await;
    let client = client();

    let missing = client
        .get(format!("{}/topics/{}", base, VIDEO))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["kind"], "video_not_indexed");

    let invalid = client
        .post(format!("{}/process", base))
        .json(&json!({ "url": "not a video" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = invalid.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_video_id");
}
