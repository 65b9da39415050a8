use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::formats::{ChapterIndexEntry, StoredRecord};
use crate::slug::ChapterSlug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("stored chapter is not valid JSON: {}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// What a wipe removed and what it could not.
#[derive(Debug, Default)]
pub struct WipeReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl WipeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// `Ok(None)` when no file exists for the slug.
    async fn read(&self, slug: &ChapterSlug) -> Result<Option<StoredRecord>, StoreError>;
    async fn write(&self, slug: &ChapterSlug, record: &[serde_json::Value])
    -> anyhow::Result<PathBuf>;
    async fn read_index(&self) -> anyhow::Result<Vec<ChapterIndexEntry>>;
    async fn write_index(&self, entries: &[ChapterIndexEntry]) -> anyhow::Result<()>;
    async fn write_audio(&self, filename: &str, bytes: &[u8]) -> anyhow::Result<PathBuf>;
    async fn delete_all(&self) -> WipeReport;
}

#[derive(Debug, Clone)]
pub struct LocalFsChapterStore {
    base_dir: PathBuf,
}

impl LocalFsChapterStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn posts_dir(&self) -> PathBuf {
        self.base_dir.join("posts")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.base_dir.join("audio")
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join("chapters.json")
    }

    pub fn chapter_path(&self, slug: &ChapterSlug) -> PathBuf {
        self.posts_dir().join(format!("{slug}.json"))
    }
}

#[async_trait]
impl ChapterStore for LocalFsChapterStore {
    async fn read(&self, slug: &ChapterSlug) -> Result<Option<StoredRecord>, StoreError> {
        let path = self.chapter_path(slug);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(record))
    }

    async fn write(
        &self,
        slug: &ChapterSlug,
        record: &[serde_json::Value],
    ) -> anyhow::Result<PathBuf> {
        let path = self.chapter_path(slug);
        write_json_atomic(&path, &record)
            .await
            .with_context(|| format!("write chapter: {}", path.display()))?;
        Ok(path)
    }

    async fn read_index(&self) -> anyhow::Result<Vec<ChapterIndexEntry>> {
        let path = self.index_path();
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_slice::<Vec<ChapterIndexEntry>>(&bytes) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "chapter index is not a valid list; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn write_index(&self, entries: &[ChapterIndexEntry]) -> anyhow::Result<()> {
        let path = self.index_path();
        write_json_atomic(&path, &entries)
            .await
            .with_context(|| format!("write chapter index: {}", path.display()))
    }

    async fn write_audio(&self, filename: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let dir = self.audio_dir();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create audio dir: {}", dir.display()))?;
        let path = dir.join(filename);
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("write audio: {}", path.display()))?;
        Ok(path)
    }

    async fn delete_all(&self) -> WipeReport {
        let mut report = WipeReport::default();
        remove_files_with_extension(&self.posts_dir(), "json", &mut report).await;
        remove_files_with_extension(&self.audio_dir(), "wav", &mut report).await;

        let index = self.index_path();
        match fs::remove_file(&index).await {
            Ok(()) => report.removed.push(index),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => report.failures.push((index, err.to_string())),
        }

        for (path, err) in &report.failures {
            tracing::warn!(path = %path.display(), %err, "failed to remove file during wipe");
        }
        report
    }
}

async fn remove_files_with_extension(dir: &Path, extension: &str, report: &mut WipeReport) {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
        Err(err) => {
            report.failures.push((dir.to_path_buf(), err.to_string()));
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                report.failures.push((dir.to_path_buf(), err.to_string()));
                break;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        match entry.file_type().await {
            Ok(ty) if ty.is_file() => {}
            _ => continue,
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed");
                report.removed.push(path);
            }
            Err(err) => report.failures.push((path, err.to_string())),
        }
    }
}

async fn read_optional(path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow::Error::new(err).context(format!("read: {}", path.display()))),
    }
}

async fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
