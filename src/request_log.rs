use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Local, TimeZone};
use tokio::io::AsyncWriteExt as _;

/// Append-only text logs, one file per endpoint, under `{data_dir}/logs/`.
#[derive(Debug, Clone)]
pub struct RequestLog {
    dir: PathBuf,
}

impl RequestLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("logs"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the log directory if needed; handlers refuse the request when this fails.
    pub async fn open(&self, endpoint: &str) -> anyhow::Result<EndpointLog> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create log dir {}", self.dir.display()))?;
        Ok(EndpointLog {
            path: self.dir.join(format!("{endpoint}.log")),
        })
    }
}

#[derive(Debug, Clone)]
pub struct EndpointLog {
    path: PathBuf,
}

impl EndpointLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line. Write failures are traced, never surfaced.
    pub async fn line(&self, message: impl AsRef<str>) {
        let line = format_line(&Local::now(), message.as_ref());
        if let Err(err) = append(&self.path, &line).await {
            tracing::warn!(path = %self.path.display(), err = %format!("{err:#}"), "request log write failed");
        }
    }
}

fn format_line<Tz: TimeZone>(at: &DateTime<Tz>, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {message}\n", at.format("%Y-%m-%d %H:%M:%S"))
}

async fn append(path: &Path, line: &str) -> anyhow::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .await
        .with_context(|| format!("append to {}", path.display()))?;
    file.flush().await.context("flush request log")?;
    Ok(())
}
