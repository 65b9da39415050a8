use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::mpsc;

use crate::cli::{ListArgs, ReplayArgs, StorageArgs, TranslateArgs, WipeArgs};
use crate::gateway::{ChapterRepository, StorageGateway};
use crate::gateway_client::GatewayClient;
use crate::genai::{ChapterAdapter, GeminiAdapter, GenAiConfig};
use crate::narrate::Narration;
use crate::page::{ChapterParser, HttpPageFetcher, PageFetcher, PageSelectors};
use crate::pipeline::{ChapterPipeline, OutcomeSource, PipelineOutcome, ProgressEvent};
use crate::render::error_block;
use crate::store::LocalFsChapterStore;
use crate::translate::Direction;

enum Backend {
    Local {
        gateway: Arc<StorageGateway>,
        audio_dir: std::path::PathBuf,
    },
    Remote(Arc<GatewayClient>),
}

impl Backend {
    fn open(storage: &StorageArgs) -> anyhow::Result<Self> {
        match &storage.server {
            Some(server) => Ok(Self::Remote(Arc::new(GatewayClient::new(server)?))),
            None => {
                let store = LocalFsChapterStore::new(&storage.data_dir);
                let audio_dir = store.audio_dir();
                Ok(Self::Local {
                    gateway: Arc::new(StorageGateway::new(Arc::new(store))),
                    audio_dir,
                })
            }
        }
    }

    fn repository(&self) -> Arc<dyn ChapterRepository> {
        match self {
            Self::Local { gateway, .. } => gateway.clone(),
            Self::Remote(client) => client.clone(),
        }
    }

    fn audio_base_url(&self, explicit: Option<&str>) -> String {
        if let Some(explicit) = explicit {
            return explicit.to_owned();
        }
        match self {
            Self::Local { audio_dir, .. } => audio_dir.display().to_string(),
            Self::Remote(client) => format!("{}/audio", client.base_url()),
        }
    }
}

pub async fn translate(args: TranslateArgs) -> anyhow::Result<()> {
    let backend = Backend::open(&args.storage)?;
    let config = GenAiConfig::from_env().context("configure generative API")?;
    let adapter: Arc<dyn ChapterAdapter> = Arc::new(GeminiAdapter::new(config)?);
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new()?);
    let pipeline = build_pipeline(&backend, adapter, fetcher, args.audio_base_url.as_deref())?;
    run_with_progress(pipeline, |pipeline| async move {
        pipeline.translate_url(&args.url).await
    })
    .await
}

pub async fn replay(args: ReplayArgs) -> anyhow::Result<()> {
    let backend = Backend::open(&args.storage)?;
    let pipeline = build_pipeline(
        &backend,
        Arc::new(Offline),
        Arc::new(Offline),
        args.audio_base_url.as_deref(),
    )?;
    run_with_progress(pipeline, |pipeline| async move {
        pipeline.replay(&args.slug).await
    })
    .await
}

pub async fn list(args: ListArgs) -> anyhow::Result<()> {
    let backend = Backend::open(&args.storage)?;
    let chapters = backend
        .repository()
        .list_index()
        .await
        .context("list chapters")?;
    if chapters.is_empty() {
        println!("no chapters stored");
        return Ok(());
    }
    for entry in chapters {
        println!(
            "{}\t{}",
            entry.slug().unwrap_or("-"),
            entry.name().unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn wipe(args: WipeArgs) -> anyhow::Result<()> {
    if !args.yes {
        anyhow::bail!("refusing to delete all chapter data without --yes");
    }
    match Backend::open(&args.storage)? {
        Backend::Local { gateway, .. } => {
            let report = gateway.delete_all().await;
            for (path, err) in &report.failures {
                eprintln!("failed to delete {}: {err}", path.display());
            }
            println!("deleted {} files", report.removed.len());
            if !report.is_clean() {
                anyhow::bail!("{} files could not be deleted", report.failures.len());
            }
        }
        Backend::Remote(client) => {
            client.delete_all().await.context("delete all chapters")?;
            println!("deleted all chapter data");
        }
    }
    Ok(())
}

fn build_pipeline(
    backend: &Backend,
    adapter: Arc<dyn ChapterAdapter>,
    fetcher: Arc<dyn PageFetcher>,
    audio_base_url: Option<&str>,
) -> anyhow::Result<ChapterPipeline> {
    Ok(ChapterPipeline::new(
        backend.repository(),
        adapter,
        fetcher,
        ChapterParser::new(&PageSelectors::default())?,
        backend.audio_base_url(audio_base_url),
    ))
}

async fn run_with_progress<F, Fut>(pipeline: ChapterPipeline, run: F) -> anyhow::Result<()>
where
    F: FnOnce(ChapterPipeline) -> Fut,
    Fut: std::future::Future<
            Output = Result<PipelineOutcome, crate::pipeline::PipelineError>,
        >,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("{}", describe_event(&event));
        }
    });

    // The pipeline owns the only sender, so the printer ends once it is dropped.
    let result = run(pipeline.with_events(tx)).await;
    printer.await.context("progress printer")?;

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(err) => {
            println!("{}", error_block(&err.to_string()));
            Err(err.into())
        }
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    for segment in &outcome.rendered {
        println!("{}", segment.primary);
        println!("{}", segment.secondary);
    }
    let source = match outcome.source {
        OutcomeSource::Cache => "stored",
        OutcomeSource::Translated => "translated",
    };
    eprintln!(
        "{source} chapter {} ({} segments, {} chapters indexed)",
        outcome.slug,
        outcome.segments.len(),
        outcome.index.len()
    );
}

fn describe_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::CacheHit { slug, segments } => {
            format!("found stored chapter {slug} ({segments} segments)")
        }
        ProgressEvent::CacheInvalid { slug, message } => {
            format!("stored chapter {slug} is unreadable ({message}); translating again")
        }
        ProgressEvent::Fetched { title, paragraphs } => {
            format!("fetched {title:?} ({paragraphs} paragraphs)")
        }
        ProgressEvent::Chunked { chunks } => format!("split into {chunks} chunks"),
        ProgressEvent::StepStarted { chunk, total, step } => {
            format!("[{chunk}/{total}] {}...", step.label())
        }
        ProgressEvent::ChunkTranslated1 { chunk, vi_text } => {
            format!("[{chunk}] Vietnamese: {} chars", vi_text.chars().count())
        }
        ProgressEvent::ChunkTranslated2 { chunk, en_text } => {
            format!("[{chunk}] English: {} chars", en_text.chars().count())
        }
        ProgressEvent::ChunkNarrated {
            chunk,
            audio_filename,
        } => format!("[{chunk}] narrated {audio_filename}"),
        ProgressEvent::ChunkPersisted {
            chunk, audio_path, ..
        } => match audio_path {
            Some(path) => format!("[{chunk}] saved ({path})"),
            None => format!("[{chunk}] saved"),
        },
        ProgressEvent::Finalized { segments } => format!("saved {segments} segments"),
        ProgressEvent::Failed { message } => format!("failed: {message}"),
    }
}

/// Stands in for the network-facing parts when replaying stored chapters.
struct Offline;

#[async_trait::async_trait]
impl ChapterAdapter for Offline {
    async fn translate(&self, _text: &str, _direction: Direction) -> anyhow::Result<String> {
        anyhow::bail!("translation is unavailable while replaying")
    }

    async fn narrate(&self, _text: &str) -> anyhow::Result<Narration> {
        anyhow::bail!("narration is unavailable while replaying")
    }
}

#[async_trait::async_trait]
impl PageFetcher for Offline {
    async fn fetch(&self, url: &url::Url) -> anyhow::Result<String> {
        anyhow::bail!("fetching {url} is unavailable while replaying")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ChunkStep;

    #[test]
    fn describes_step_progress() {
        let event = ProgressEvent::StepStarted {
            chunk: 2,
            total: 3,
            step: ChunkStep::TranslateEnglish,
        };
        assert_eq!(describe_event(&event), "[2/3] translate to English...");
    }

    #[test]
    fn remote_audio_links_point_at_server() {
        let backend = Backend::open(&StorageArgs {
            server: Some("http://127.0.0.1:9000/".to_owned()),
            data_dir: "unused".into(),
        })
        .unwrap();
        assert_eq!(backend.audio_base_url(None), "http://127.0.0.1:9000/audio");
        assert_eq!(
            backend.audio_base_url(Some("https://cdn.example/a")),
            "https://cdn.example/a"
        );
    }
}
