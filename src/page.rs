use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use url::Url;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build page http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> anyhow::Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "*/*")
            .header(
                ACCEPT_LANGUAGE,
                "vi,vi-VN;q=0.9,en-GB;q=0.8,en;q=0.7,en-US;q=0.4",
            )
            .header(REFERER, url.origin().ascii_serialization())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("failed to fetch {url}: {status}");
        }
        response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelectors {
    pub title: String,
    pub paragraphs: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            title: ".top-title > .chapter-name".to_owned(),
            paragraphs: "#bookContentBody p".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPage {
    /// `None` when the title element is missing or blank.
    pub title: Option<String>,
    /// Outer HTML of each body paragraph, in document order.
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChapterParser {
    title: Selector,
    paragraphs: Selector,
}

impl ChapterParser {
    pub fn new(selectors: &PageSelectors) -> anyhow::Result<Self> {
        Ok(Self {
            title: compile(&selectors.title)?,
            paragraphs: compile(&selectors.paragraphs)?,
        })
    }

    pub fn parse(&self, html: &str) -> ChapterPage {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_owned())
            .filter(|title| !title.is_empty());

        let paragraphs = document
            .select(&self.paragraphs)
            .map(|el| el.html())
            .collect();

        ChapterPage { title, paragraphs }
    }
}

fn compile(raw: &str) -> anyhow::Result<Selector> {
    Selector::parse(raw).map_err(|err| anyhow::anyhow!("invalid CSS selector {raw:?}: {err}"))
}
