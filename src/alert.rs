use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

use crate::models::CheckResult;

// Don't alert about the same portal more than once per day.
pub const ALERT_COOLDOWN_HOURS: i64 = 24;
// Pause between consecutive sends to stay under outbound rate limits.
pub const INTER_SEND_DELAY: Duration = Duration::from_secs(2);

pub struct Alerter {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Alerter {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub fn render_message(result: &CheckResult) -> String {
        format!(
            "{} is DOWN ({})",
            result.site.name,
            result.failure_reason.as_deref().unwrap_or("Unknown error")
        )
    }

    pub async fn notify_down(&self, result: &CheckResult) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };

        let status_text = result
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "No response".into());
        let reason = result
            .failure_reason
            .clone()
            .unwrap_or_else(|| "Unknown error".into());

        let mut fields = vec![
            json!({ "name": "Portal", "value": result.site.name, "inline": true }),
            json!({ "name": "URL", "value": result.site.url, "inline": true }),
            json!({ "name": "HTTP Status", "value": status_text, "inline": true }),
            json!({ "name": "Reason", "value": reason, "inline": false }),
        ];
        if let Some(path) = &result.evidence_path {
            fields.push(json!({
                "name": "Evidence",
                "value": path.display().to_string(),
                "inline": false
            }));
        }

        let payload = json!({
            "username": "RTI Pulse",
            "embeds": [{
                "title": "RTI Portal Down",
                "color": 0xE74C3C,
                "fields": fields,
                "timestamp": Utc::now().to_rfc3339(),
                "footer": { "text": "RTI Pulse portal monitor" }
            }]
        });

        self.client
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
