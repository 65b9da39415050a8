use std::fs;
use std::path::Path;

use base64::Engine as _;
use novelvoice::formats::{Segment, UpsertRequest};
use novelvoice::gateway::ChapterRepository;
use novelvoice::gateway_client::GatewayClient;
use novelvoice::server::{ServerConfig, router};
use serde_json::{Value, json};

async fn spawn_server(data_dir: &Path) -> String {
    let app = router(&ServerConfig::new(data_dir)).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn segment() -> Segment {
    Segment {
        chapter_name: "Chương 5".to_owned(),
        vi_text: "<p>xin chào</p>".to_owned(),
        en_text: "<p>hello</p>".to_owned(),
        audio_filename: "audio_5.wav".to_owned(),
    }
}

#[tokio::test]
async fn upsert_lookup_and_list_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;
    let http = reqwest::Client::new();

    let request = UpsertRequest::new("chap-5", &[segment()])
        .unwrap()
        .with_audio(
            base64::engine::general_purpose::STANDARD.encode(b"RIFF-bytes"),
            "audio_5.wav",
        );
    let resp = http
        .post(format!("{base}/upsert"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5174")
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "json_path": "posts/chap-5.json",
            "audio_path": "/audio/audio_5.wav",
        })
    );

    let body: Value = http
        .get(format!("{base}/lookup?chapter_name=chap-5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["exists"], true);
    assert_eq!(body["data"][0]["enText"], "<p>hello</p>");

    let body: Value = http
        .get(format!("{base}/list-index"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({"success": true, "chapters": [{"slug": "chap-5", "name": "Chương 5"}]})
    );

    let audio = http
        .get(format!("{base}/audio/audio_5.wav"))
        .send()
        .await
        .unwrap();
    assert_eq!(audio.status(), 200);
    assert_eq!(audio.bytes().await.unwrap().as_ref(), b"RIFF-bytes");

    let log = fs::read_to_string(dir.path().join("logs/upsert.log")).unwrap();
    assert!(log.contains("Request method: POST"));
    assert!(log.contains("Saved posts/chap-5.json"));
}

#[tokio::test]
async fn lookup_of_missing_chapter_reports_absence() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let body: Value = reqwest::get(format!("{base}/lookup?chapter_name=nothing"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"success": true, "exists": false, "data": []}));
}

#[tokio::test]
async fn bad_requests_get_json_errors() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;
    let http = reqwest::Client::new();

    let resp = reqwest::get(format!("{base}/lookup")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "missing chapter_name");

    let resp = http
        .post(format!("{base}/upsert"))
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));

    let resp = http
        .post(format!("{base}/upsert"))
        .json(&json!({
            "chapter_name": "chap-1",
            "json_data": [],
            "audio_data": "%%%",
            "audio_filename": "a.wav",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = http
        .delete(format!("{base}/list-index"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
    assert!(resp.headers().contains_key("access-control-allow-origin"));
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn corrupt_stored_chapter_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("posts")).unwrap();
    fs::write(dir.path().join("posts/bad.json"), "[{").unwrap();
    let base = spawn_server(dir.path()).await;

    let resp = reqwest::get(format!("{base}/lookup?chapter_name=bad"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn preflight_is_answered_on_every_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;
    let http = reqwest::Client::new();

    for path in ["/lookup", "/list-index", "/upsert", "/delete-all"] {
        let resp = http
            .request(reqwest::Method::OPTIONS, format!("{base}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "{path}");
        let headers = resp.headers();
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(
            headers["access-control-allow-headers"],
            "Content-Type, Authorization"
        );
        assert_eq!(headers["access-control-max-age"], "86400");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            json!({"success": true, "message": "OPTIONS request handled"})
        );
    }
}

#[tokio::test]
async fn logs_path_blocked_by_a_file_yields_500() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("logs"), "in the way").unwrap();
    let base = spawn_server(dir.path()).await;

    let resp = reqwest::get(format!("{base}/list-index")).await.unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn gateway_client_round_trips_through_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;
    let client = GatewayClient::new(&base).unwrap();

    assert!(!client.lookup("chap-5").await.unwrap().exists);
    client
        .upsert(UpsertRequest::new("chap-5", &[segment()]).unwrap())
        .await
        .unwrap();

    let found = client.lookup("chap-5").await.unwrap();
    assert_eq!(found.segments().unwrap(), vec![segment()]);
    assert_eq!(client.list_index().await.unwrap().len(), 1);

    let err = client
        .upsert(UpsertRequest::default())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("missing chapter_name"));

    client.delete_all().await.unwrap();
    assert!(client.list_index().await.unwrap().is_empty());
    assert!(!dir.path().join("chapters.json").exists());
}

#[tokio::test]
async fn undecodable_lookup_query_is_a_logged_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let resp = reqwest::get(format!("{base}/lookup?chapter_name=a&chapter_name=b"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(resp.headers().contains_key("access-control-allow-origin"));
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().starts_with("invalid query"),
        "{body}"
    );

    let log = fs::read_to_string(dir.path().join("logs/lookup.log")).unwrap();
    assert!(log.contains("Request method: GET"));
    assert!(log.contains("Error 400: invalid query"));
}
