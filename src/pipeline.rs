use std::sync::Arc;

use base64::Engine as _;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::chunk::chunk_paragraphs;
use crate::formats::{ChapterIndexEntry, Segment, UpsertRequest};
use crate::gateway::ChapterRepository;
use crate::genai::ChapterAdapter;
use crate::page::{ChapterParser, PageFetcher};
use crate::render::{RenderedSegment, render_segments};
use crate::slug::ChapterSlug;
use crate::translate::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStep {
    TranslateVietnamese,
    TranslateEnglish,
    Narrate,
    Persist,
}

impl ChunkStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::TranslateVietnamese => "translate to Vietnamese",
            Self::TranslateEnglish => "translate to English",
            Self::Narrate => "narrate",
            Self::Persist => "persist",
        }
    }
}

/// Progress of one pipeline run; `chunk` numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    CacheHit { slug: ChapterSlug, segments: usize },
    /// Stored data exists but is unusable; the run continues as a cache miss.
    CacheInvalid { slug: ChapterSlug, message: String },
    Fetched { title: String, paragraphs: usize },
    Chunked { chunks: usize },
    StepStarted { chunk: usize, total: usize, step: ChunkStep },
    ChunkTranslated1 { chunk: usize, vi_text: String },
    ChunkTranslated2 { chunk: usize, en_text: String },
    ChunkNarrated { chunk: usize, audio_filename: String },
    ChunkPersisted { chunk: usize, segment: Segment, audio_path: Option<String> },
    Finalized { segments: usize },
    Failed { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid chapter url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("cannot derive a chapter slug from {0:?}")]
    NoSlug(String),
    #[error("chapter {0} is not stored")]
    ChapterNotFound(ChapterSlug),
    #[error("stored data for chapter {slug} is not a valid segment list")]
    MalformedRecord {
        slug: ChapterSlug,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetch chapter page: {0:#}")]
    Fetch(anyhow::Error),
    #[error("{} failed for chunk {chunk}/{total}: {error:#}", .step.label())]
    Upstream {
        step: ChunkStep,
        chunk: usize,
        total: usize,
        error: anyhow::Error,
    },
    #[error("storage: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    Cache,
    Translated,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub slug: ChapterSlug,
    pub source: OutcomeSource,
    pub segments: Vec<Segment>,
    pub rendered: Vec<RenderedSegment>,
    pub index: Vec<ChapterIndexEntry>,
}

pub struct ChapterPipeline {
    repository: Arc<dyn ChapterRepository>,
    adapter: Arc<dyn ChapterAdapter>,
    fetcher: Arc<dyn PageFetcher>,
    parser: ChapterParser,
    audio_base_url: String,
    events: Option<UnboundedSender<ProgressEvent>>,
}

impl ChapterPipeline {
    pub fn new(
        repository: Arc<dyn ChapterRepository>,
        adapter: Arc<dyn ChapterAdapter>,
        fetcher: Arc<dyn PageFetcher>,
        parser: ChapterParser,
        audio_base_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            adapter,
            fetcher,
            parser,
            audio_base_url: audio_base_url.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Translates and narrates the chapter at `raw_url`, or renders it from storage
    /// when it was processed before.
    pub async fn translate_url(&self, raw_url: &str) -> Result<PipelineOutcome, PipelineError> {
        let result = self.try_translate_url(raw_url).await;
        self.report_failure(&result);
        result
    }

    /// Renders a stored chapter without touching the network.
    pub async fn replay(&self, raw_slug: &str) -> Result<PipelineOutcome, PipelineError> {
        let result = self.try_replay(raw_slug).await;
        self.report_failure(&result);
        result
    }

    async fn try_translate_url(&self, raw_url: &str) -> Result<PipelineOutcome, PipelineError> {
        let url = parse_chapter_url(raw_url)?;
        let slug = ChapterSlug::from_url(&url)
            .ok_or_else(|| PipelineError::NoSlug(raw_url.to_owned()))?;

        match self.cached_segments(&slug).await? {
            Some(Ok(segments)) => return Ok(self.cached_outcome(slug, segments).await),
            Some(Err(source)) => {
                tracing::warn!(%slug, %source, "stored chapter is malformed; translating again");
                self.emit(ProgressEvent::CacheInvalid {
                    slug: slug.clone(),
                    message: source.to_string(),
                });
            }
            None => tracing::info!(%slug, "cache miss"),
        }

        let html = self.fetcher.fetch(&url).await.map_err(PipelineError::Fetch)?;
        let page = self.parser.parse(&html);
        let chapter_name = page.title.unwrap_or_else(|| slug.to_string());
        self.emit(ProgressEvent::Fetched {
            title: chapter_name.clone(),
            paragraphs: page.paragraphs.len(),
        });

        let chunks = chunk_paragraphs(&page.paragraphs);
        tracing::info!(%slug, chapter = %chapter_name, chunks = chunks.len(), "chapter chunked");
        self.emit(ProgressEvent::Chunked {
            chunks: chunks.len(),
        });

        let total = chunks.len();
        let mut segments = Vec::with_capacity(total);
        for (idx, chunk) in chunks.iter().enumerate() {
            let segment = self
                .process_chunk(&slug, &chapter_name, chunk, idx + 1, total)
                .await?;
            segments.push(segment);
        }

        // Rewrites the whole record in reading order after the per-chunk saves.
        let request = UpsertRequest::new(slug.as_str(), &segments)
            .map_err(|err| PipelineError::Storage(err.into()))?;
        self.repository
            .upsert(request)
            .await
            .map_err(PipelineError::Storage)?;
        self.emit(ProgressEvent::Finalized {
            segments: segments.len(),
        });
        tracing::info!(%slug, segments = segments.len(), "chapter finalized");

        let index = self.refresh_index().await;
        let rendered = render_segments(&segments, &self.audio_base_url);
        Ok(PipelineOutcome {
            slug,
            source: OutcomeSource::Translated,
            segments,
            rendered,
            index,
        })
    }

    async fn process_chunk(
        &self,
        slug: &ChapterSlug,
        chapter_name: &str,
        chunk_text: &str,
        chunk: usize,
        total: usize,
    ) -> Result<Segment, PipelineError> {
        let upstream = |step: ChunkStep| {
            move |error: anyhow::Error| PipelineError::Upstream {
                step,
                chunk,
                total,
                error,
            }
        };

        self.step_started(chunk, total, ChunkStep::TranslateVietnamese);
        let vi_text = self
            .adapter
            .translate(chunk_text, Direction::ToVietnamese)
            .await
            .map_err(upstream(ChunkStep::TranslateVietnamese))?;
        self.emit(ProgressEvent::ChunkTranslated1 {
            chunk,
            vi_text: vi_text.clone(),
        });

        self.step_started(chunk, total, ChunkStep::TranslateEnglish);
        let en_text = self
            .adapter
            .translate(&vi_text, Direction::ToEnglish)
            .await
            .map_err(upstream(ChunkStep::TranslateEnglish))?;
        self.emit(ProgressEvent::ChunkTranslated2 {
            chunk,
            en_text: en_text.clone(),
        });

        self.step_started(chunk, total, ChunkStep::Narrate);
        let narration = self
            .adapter
            .narrate(&en_text)
            .await
            .map_err(upstream(ChunkStep::Narrate))?;
        self.emit(ProgressEvent::ChunkNarrated {
            chunk,
            audio_filename: narration.filename.clone(),
        });

        self.step_started(chunk, total, ChunkStep::Persist);
        let segment = Segment {
            chapter_name: chapter_name.to_owned(),
            vi_text,
            en_text,
            audio_filename: narration.filename.clone(),
        };
        let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&narration.wav);
        let request = UpsertRequest::new(slug.as_str(), std::slice::from_ref(&segment))
            .map_err(|err| PipelineError::Storage(err.into()))?
            .with_audio(audio_base64, narration.filename);
        let outcome = self
            .repository
            .upsert(request)
            .await
            .map_err(PipelineError::Storage)?;
        tracing::info!(%slug, chunk, total, audio = ?outcome.audio_path, "chunk persisted");
        self.emit(ProgressEvent::ChunkPersisted {
            chunk,
            segment: segment.clone(),
            audio_path: outcome.audio_path,
        });

        Ok(segment)
    }

    async fn try_replay(&self, raw_slug: &str) -> Result<PipelineOutcome, PipelineError> {
        let slug =
            ChapterSlug::new(raw_slug).ok_or_else(|| PipelineError::NoSlug(raw_slug.to_owned()))?;
        match self.cached_segments(&slug).await? {
            Some(Ok(segments)) => Ok(self.cached_outcome(slug, segments).await),
            Some(Err(source)) => Err(PipelineError::MalformedRecord { slug, source }),
            None => Err(PipelineError::ChapterNotFound(slug)),
        }
    }

    /// `None` on a miss; `Some(Err(_))` when stored data is not a segment list.
    async fn cached_segments(
        &self,
        slug: &ChapterSlug,
    ) -> Result<Option<Result<Vec<Segment>, serde_json::Error>>, PipelineError> {
        let lookup = self
            .repository
            .lookup(slug.as_str())
            .await
            .map_err(PipelineError::Storage)?;
        if !lookup.exists {
            return Ok(None);
        }
        Ok(Some(lookup.segments()))
    }

    async fn cached_outcome(&self, slug: ChapterSlug, segments: Vec<Segment>) -> PipelineOutcome {
        tracing::info!(%slug, segments = segments.len(), "cache hit");
        self.emit(ProgressEvent::CacheHit {
            slug: slug.clone(),
            segments: segments.len(),
        });
        let index = self.refresh_index().await;
        let rendered = render_segments(&segments, &self.audio_base_url);
        PipelineOutcome {
            slug,
            source: OutcomeSource::Cache,
            segments,
            rendered,
            index,
        }
    }

    async fn refresh_index(&self) -> Vec<ChapterIndexEntry> {
        match self.repository.list_index().await {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!(err = %format!("{err:#}"), "refresh chapter index failed");
                Vec::new()
            }
        }
    }

    fn step_started(&self, chunk: usize, total: usize, step: ChunkStep) {
        tracing::debug!(chunk, total, step = step.label(), "chunk step");
        self.emit(ProgressEvent::StepStarted { chunk, total, step });
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn report_failure<T>(&self, result: &Result<T, PipelineError>) {
        if let Err(err) = result {
            tracing::error!(%err, "chapter pipeline failed");
            self.emit(ProgressEvent::Failed {
                message: err.to_string(),
            });
        }
    }
}

fn parse_chapter_url(raw: &str) -> Result<Url, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidUrl {
        url: raw.to_owned(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http/https".to_owned()));
    }
    Ok(url)
}
