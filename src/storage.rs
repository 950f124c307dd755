use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const STATUS_LOG_CAP: usize = 10_000;
pub const POST_LOG_CAP: usize = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: u64,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEntry {
    pub id: u64,
    pub url: String,
    pub message: String,
    pub status: String,
    pub error: Option<String>,
    pub posted_at: DateTime<Utc>,
}

/// Append-only time-series of check verdicts, one JSON array on disk.
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            path: logs_dir.as_ref().join("website_status.json"),
        }
    }

    pub fn append(
        &self,
        url: &str,
        status: Option<u16>,
        error: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries: Vec<StatusEntry> = read_entries(&self.path);
        entries.push(StatusEntry {
            id: entries.last().map(|e| e.id).unwrap_or(0) + 1,
            url: url.to_string(),
            status,
            error: error.map(str::to_string),
            checked_at,
        });
        cap_entries(&mut entries, STATUS_LOG_CAP);
        write_entries(&self.path, &entries)
    }

    pub fn tail(&self, limit: usize) -> Vec<StatusEntry> {
        let entries: Vec<StatusEntry> = read_entries(&self.path);
        let skip = entries.len().saturating_sub(limit);
        entries.into_iter().skip(skip).collect()
    }
}

/// Log of alert sends, also the source of truth for the alert cooldown.
#[derive(Debug, Clone)]
pub struct PostLog {
    path: PathBuf,
}

impl PostLog {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            path: logs_dir.as_ref().join("post_logs.json"),
        }
    }

    pub fn append(
        &self,
        url: &str,
        message: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let mut entries: Vec<PostEntry> = read_entries(&self.path);
        entries.push(PostEntry {
            id: entries.last().map(|e| e.id).unwrap_or(0) + 1,
            url: url.to_string(),
            message: message.to_string(),
            status: status.to_string(),
            error: error.map(str::to_string),
            posted_at: Utc::now(),
        });
        cap_entries(&mut entries, POST_LOG_CAP);
        write_entries(&self.path, &entries)
    }

    pub fn last_success_time(&self, url: &str) -> Option<DateTime<Utc>> {
        let entries: Vec<PostEntry> = read_entries(&self.path);
        entries
            .iter()
            .filter(|e| e.url == url && e.status == "success")
            .map(|e| e.posted_at)
            .max()
    }
}

// A corrupt log file loses its history rather than wedging the monitor.
fn read_entries<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&data) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not parse {}: {} (starting fresh)", path.display(), e);
            Vec::new()
        }
    }
}

fn write_entries<T: Serialize>(path: &Path, entries: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

fn cap_entries<T>(entries: &mut Vec<T>, cap: usize) {
    if entries.len() > cap {
        let excess = entries.len() - cap;
        entries.drain(..excess);
    }
}
