use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;

use crate::formats::{ChapterIndexEntry, Lookup, StoredRecord, UpsertOutcome, UpsertRequest};
use crate::slug::ChapterSlug;
use crate::store::{ChapterStore, StoreError, WipeReport};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("audio_data is not valid base64")]
    InvalidAudio(#[source] base64::DecodeError),
    #[error("stored data for {slug} is not valid JSON")]
    CorruptRecord {
        slug: ChapterSlug,
        #[source]
        source: StoreError,
    },
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl GatewayError {
    /// Whether the caller sent something unusable (as opposed to a server fault).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidAudio(_))
    }
}

/// The chapter operations the pipeline needs, in-process or over HTTP.
#[async_trait]
pub trait ChapterRepository: Send + Sync {
    async fn lookup(&self, chapter_name: &str) -> anyhow::Result<Lookup>;
    async fn list_index(&self) -> anyhow::Result<Vec<ChapterIndexEntry>>;
    async fn upsert(&self, request: UpsertRequest) -> anyhow::Result<UpsertOutcome>;
    async fn delete_all(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ChapterStore>,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ChapterStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, chapter_name: &str) -> Result<Lookup, GatewayError> {
        if chapter_name.is_empty() {
            return Err(GatewayError::InvalidInput("missing chapter_name"));
        }
        let slug = ChapterSlug::new(chapter_name)
            .ok_or(GatewayError::InvalidInput("missing chapter_name"))?;

        match self.store.read(&slug).await {
            Ok(Some(record)) => {
                if matches!(record, StoredRecord::One(_)) {
                    tracing::warn!(%slug, "stored chapter is not a list; wrapping it");
                }
                Ok(Lookup {
                    exists: true,
                    data: record.normalize(),
                })
            }
            Ok(None) => {
                tracing::debug!(%slug, "chapter not stored");
                Ok(Lookup::missing())
            }
            Err(source @ StoreError::Corrupt { .. }) => {
                Err(GatewayError::CorruptRecord { slug, source })
            }
            Err(StoreError::Io(err)) => Err(GatewayError::Storage(err)),
        }
    }

    pub async fn list_index(&self) -> Vec<ChapterIndexEntry> {
        match self.store.read_index().await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(err = %format!("{err:#}"), "read chapter index failed; returning empty list");
                Vec::new()
            }
        }
    }

    pub async fn upsert(&self, request: UpsertRequest) -> Result<UpsertOutcome, GatewayError> {
        let UpsertRequest {
            chapter_name,
            json_data,
            audio_data,
            audio_filename,
        } = request;

        if chapter_name.is_empty() {
            return Err(GatewayError::InvalidInput("missing chapter_name"));
        }
        let items = json_data.map(StoredRecord::normalize).unwrap_or_default();
        let display_name = display_name(&items).unwrap_or_else(|| chapter_name.clone());
        let slug = ChapterSlug::new(&chapter_name).ok_or(GatewayError::InvalidInput(
            "chapter_name is invalid after sanitization",
        ))?;

        let audio = match (audio_data.as_deref(), audio_filename.as_deref()) {
            (Some(data), Some(filename)) if !data.is_empty() && !filename.is_empty() => {
                let filename = audio_file_name(filename)
                    .ok_or(GatewayError::InvalidInput("audio_filename is invalid"))?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(GatewayError::InvalidAudio)?;
                Some((filename, bytes))
            }
            _ => None,
        };

        if !items.is_empty() {
            let path = self
                .store
                .write(&slug, &items)
                .await
                .map_err(GatewayError::Storage)?;
            self.replace_index_entry(&slug, display_name)
                .await
                .map_err(GatewayError::Storage)?;
            tracing::info!(%slug, path = %path.display(), segments = items.len(), "chapter saved");
        }

        let audio_path = match audio {
            Some((filename, bytes)) => {
                self.store
                    .write_audio(&filename, &bytes)
                    .await
                    .map_err(GatewayError::Storage)?;
                tracing::info!(%slug, filename = %filename, bytes = bytes.len(), "audio saved");
                Some(format!("/audio/{filename}"))
            }
            None => None,
        };

        Ok(UpsertOutcome {
            json_path: format!("posts/{slug}.json"),
            audio_path,
        })
    }

    pub async fn delete_all(&self) -> WipeReport {
        let report = self.store.delete_all().await;
        tracing::info!(
            removed = report.removed.len(),
            failed = report.failures.len(),
            "wiped chapter data"
        );
        report
    }

    async fn replace_index_entry(&self, slug: &ChapterSlug, name: String) -> anyhow::Result<()> {
        let mut entries = self.store.read_index().await?;
        entries.retain(|entry| entry.slug() != Some(slug.as_str()));
        entries.push(ChapterIndexEntry::new(slug.as_str(), name));
        self.store.write_index(&entries).await
    }
}

fn display_name(items: &[Value]) -> Option<String> {
    items
        .first()?
        .get("chapterName")?
        .as_str()
        .map(str::to_owned)
}

/// Keeps only the final path component so uploads stay inside `audio/`.
fn audio_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}

#[async_trait]
impl ChapterRepository for StorageGateway {
    async fn lookup(&self, chapter_name: &str) -> anyhow::Result<Lookup> {
        Ok(StorageGateway::lookup(self, chapter_name).await?)
    }

    async fn list_index(&self) -> anyhow::Result<Vec<ChapterIndexEntry>> {
        Ok(StorageGateway::list_index(self).await)
    }

    async fn upsert(&self, request: UpsertRequest) -> anyhow::Result<UpsertOutcome> {
        Ok(StorageGateway::upsert(self, request).await?)
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        StorageGateway::delete_all(self).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn display_name_reads_first_segment() {
        let items = vec![json!({"chapterName": "Chương 1"}), json!({"chapterName": "x"})];
        assert_eq!(display_name(&items).as_deref(), Some("Chương 1"));
        assert_eq!(display_name(&[json!({"viText": "a"})]), None);
        assert_eq!(display_name(&[]), None);
    }

    #[test]
    fn audio_file_name_strips_directories() {
        assert_eq!(audio_file_name("audio_1.wav").as_deref(), Some("audio_1.wav"));
        assert_eq!(audio_file_name("../../etc/a.wav").as_deref(), Some("a.wav"));
        assert_eq!(audio_file_name(".."), None);
        assert_eq!(audio_file_name("/"), None);
    }

    #[test]
    fn client_errors_are_flagged() {
        assert!(GatewayError::InvalidInput("x").is_client_error());
        assert!(!GatewayError::Storage(anyhow::anyhow!("disk")).is_client_error());
    }
}
