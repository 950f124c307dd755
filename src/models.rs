use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Status {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredSite {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub site: MonitoredSite,
    pub http_status: Option<u16>,
    pub functional: bool,
    pub failure_reason: Option<String>,
    pub evidence_path: Option<PathBuf>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn up(site: MonitoredSite, http_status: Option<u16>) -> Self {
        Self {
            site,
            http_status,
            functional: true,
            failure_reason: None,
            evidence_path: None,
            checked_at: Utc::now(),
        }
    }

    pub fn down(
        site: MonitoredSite,
        http_status: Option<u16>,
        reason: impl Into<String>,
        evidence_path: Option<PathBuf>,
    ) -> Self {
        Self {
            site,
            http_status,
            functional: false,
            failure_reason: Some(reason.into()),
            evidence_path,
            checked_at: Utc::now(),
        }
    }

    pub fn status(&self) -> Status {
        if self.functional { Status::Up } else { Status::Down }
    }
}

pub struct MonitorState {
    pub last_results: HashMap<String, CheckResult>,
}
