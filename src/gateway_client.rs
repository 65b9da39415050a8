use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::formats::{ChapterIndexEntry, Lookup, UpsertOutcome, UpsertRequest};
use crate::gateway::ChapterRepository;

/// [`ChapterRepository`] backed by a running `novelvoice-server`.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("gateway url is empty");
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        what: &str,
        request: reqwest::RequestBuilder,
    ) -> anyhow::Result<T> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("send {what} request to {}", self.base_url))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("read {what} response"))?;
        if !status.is_success() {
            let message = error_message(&body).unwrap_or(body);
            anyhow::bail!("{what} failed ({status}): {message}");
        }
        serde_json::from_str(&body).with_context(|| format!("parse {what} response: {body}"))
    }
}

#[derive(Deserialize)]
struct ListIndexResponse {
    #[serde(default)]
    chapters: Vec<ChapterIndexEntry>,
}

#[derive(Deserialize)]
struct LookupResponse {
    exists: bool,
    #[serde(default)]
    data: Vec<Value>,
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_owned)
}

#[async_trait]
impl ChapterRepository for GatewayClient {
    async fn lookup(&self, chapter_name: &str) -> anyhow::Result<Lookup> {
        let req = self
            .client
            .get(format!("{}/lookup", self.base_url))
            .query(&[("chapter_name", chapter_name)]);
        let resp: LookupResponse = self.send("lookup", req).await?;
        if !resp.exists {
            return Ok(Lookup::missing());
        }
        Ok(Lookup {
            exists: true,
            data: resp.data,
        })
    }

    async fn list_index(&self) -> anyhow::Result<Vec<ChapterIndexEntry>> {
        let req = self.client.get(format!("{}/list-index", self.base_url));
        let resp: ListIndexResponse = self.send("list-index", req).await?;
        Ok(resp.chapters)
    }

    async fn upsert(&self, request: UpsertRequest) -> anyhow::Result<UpsertOutcome> {
        let req = self
            .client
            .post(format!("{}/upsert", self.base_url))
            .json(&request);
        self.send("upsert", req).await
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let req = self.client.post(format!("{}/delete-all", self.base_url));
        let _: Value = self.send("delete-all", req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error":"missing chapter_name"}"#).as_deref(),
            Some("missing chapter_name")
        );
        assert_eq!(error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn base_url_is_normalized() {
        let client = GatewayClient::new(" http://127.0.0.1:8080/ ").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
        assert!(GatewayClient::new("  ").is_err());
    }
}
