use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use crate::models::MonitoredSite;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_sites_file")]
    pub sites_file: String,
    pub check_interval: u64,
    pub webhook_url: Option<String>,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default)]
    pub checker: CheckerConfig,
}

fn default_sites_file() -> String { "websites.json".into() }
fn default_api_port() -> u16 { 3000 }
fn default_logs_dir() -> String { "logs".into() }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckerConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_browser_timeout_ms")]
    pub browser_timeout_ms: u64,
}

pub fn default_request_timeout_ms() -> u64 { 15_000 }
pub fn default_max_retries() -> u32 { 2 }
pub fn default_retry_delay_ms() -> u64 { 3_000 }
pub fn default_browser_timeout_ms() -> u64 { 15_000 }

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            browser_timeout_ms: default_browser_timeout_ms(),
        }
    }
}

impl CheckerConfig {
    // Environment variables win over config.json values.
    pub fn apply_env(&mut self) {
        env_override("REQUEST_TIMEOUT_MS", &mut self.request_timeout_ms);
        env_override("MAX_RETRIES", &mut self.max_retries);
        env_override("RETRY_DELAY_MS", &mut self.retry_delay_ms);
        env_override("BROWSER_TIMEOUT_MS", &mut self.browser_timeout_ms);
        if self.max_retries == 0 {
            warn!("MAX_RETRIES of 0 makes no checks at all, using 1");
            self.max_retries = 1;
        }
    }
}

fn env_override<T: std::str::FromStr + std::fmt::Display>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("{} should be a number, using default: {}", name, slot),
        }
    }
}

// Read fresh every cycle so dashboard-side edits take effect without a restart.
pub fn load_sites(path: impl AsRef<Path>) -> Vec<MonitoredSite> {
    let path = path.as_ref();
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Could not read sites file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let sites: Vec<MonitoredSite> = match serde_json::from_str(&data) {
        Ok(sites) => sites,
        Err(e) => {
            warn!("Could not parse sites file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut seen_urls = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut deduped = Vec::with_capacity(sites.len());
    for site in sites {
        let url_key = site.url.to_lowercase();
        let name_key = site.name.to_lowercase();
        if !seen_urls.insert(url_key) || !seen_names.insert(name_key) {
            warn!("Skipping duplicate site entry: {} ({})", site.name, site.url);
            continue;
        }
        deduped.push(site);
    }
    deduped
}
