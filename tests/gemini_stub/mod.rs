use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use serde_json::Value;

/// PCM the stub returns for speech requests: samples 0 and 16384.
pub const STUB_PCM: [u8; 4] = [0x00, 0x00, 0x00, 0x40];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeechReply {
    /// `inlineData` carrying [`STUB_PCM`].
    #[default]
    Pcm,
    /// A text part where the audio should be.
    NoInlineData,
    InvalidBase64,
    /// A single byte, too short for one 16-bit sample.
    OneByte,
}

#[derive(Debug, Clone, Default)]
pub struct GeminiStubConfig {
    /// Answer the first `fail_first` requests with a 503.
    pub fail_first: usize,
    /// Answer every request from this (0-based) index on with a 503.
    pub fail_from: Option<usize>,
    pub speech: SpeechReply,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    pub fn is_speech(&self) -> bool {
        self.body
            .pointer("/generationConfig/responseModalities/0")
            .and_then(Value::as_str)
            == Some("AUDIO")
    }
}

pub struct GeminiStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl GeminiStub {
    pub fn spawn(config: GeminiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start gemini stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1beta");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post
                    || !path.starts_with("/v1beta/models/")
                    || !path.ends_with(":generateContent")
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let api_key = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("x-goog-api-key"))
                    .map(|h| h.value.as_str().to_owned());

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let Ok(body) = serde_json::from_str::<Value>(&body) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid json").with_status_code(400),
                    );
                    continue;
                };

                let recorded_request = RecordedRequest {
                    path,
                    api_key,
                    body,
                };
                let index = {
                    let mut all = recorded.lock().expect("lock recorded requests");
                    all.push(recorded_request.clone());
                    all.len() - 1
                };

                let failing = index < config.fail_first
                    || config.fail_from.is_some_and(|from| index >= from);
                let (status, response_body) = if failing {
                    (
                        503,
                        serde_json::json!({
                            "error": { "code": 503, "message": "model is overloaded" }
                        }),
                    )
                } else if recorded_request.is_speech() {
                    (200, speech_response(config.speech))
                } else {
                    (200, text_response(&recorded_request.body))
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock recorded requests").clone()
    }
}

impl Drop for GeminiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Tags the passage after the instructions with `VI:` or `EN:` depending on the pass.
fn text_response(body: &Value) -> Value {
    let prompt = body
        .pointer("/contents/0/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (instructions, passage) = prompt.split_once("\n\n").unwrap_or(("", prompt));
    let tag = if instructions.contains("Vietnamese prose") {
        "VI:"
    } else {
        "EN:"
    };
    serde_json::json!({
        "candidates": [
            { "content": { "role": "model", "parts": [ { "text": format!("{tag}{passage}") } ] } }
        ]
    })
}

fn speech_response(reply: SpeechReply) -> Value {
    let data = match reply {
        SpeechReply::Pcm => base64::engine::general_purpose::STANDARD.encode(STUB_PCM),
        SpeechReply::NoInlineData => {
            return serde_json::json!({
                "candidates": [ { "content": { "parts": [ { "text": "I cannot speak" } ] } } ]
            });
        }
        SpeechReply::InvalidBase64 => "***not base64***".to_owned(),
        SpeechReply::OneByte => base64::engine::general_purpose::STANDARD.encode([0x01u8]),
    };
    serde_json::json!({
        "candidates": [
            { "content": { "parts": [
                { "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": data } }
            ] } }
        ]
    })
}
