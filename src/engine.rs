use anyhow::Result;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::alert::{Alerter, ALERT_COOLDOWN_HOURS, INTER_SEND_DELAY};
use crate::browser::BrowserPool;
use crate::classify;
use crate::config::{self, MonitorConfig};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::models::{CheckResult, MonitorState, MonitoredSite, Status};
use crate::storage::{PostLog, StatusLog};

pub struct Monitor {
    pub config: MonitorConfig,
    fetcher: Fetcher,
    browser: BrowserPool,
    alerter: Alerter,
    status_log: StatusLog,
    post_log: PostLog,
    pub state: Arc<Mutex<MonitorState>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let fetcher = Fetcher::new(&config.checker)?;
        let browser = BrowserPool::new(
            Duration::from_millis(config.checker.browser_timeout_ms),
            Path::new(&config.logs_dir).join("screenshots"),
        );
        let alerter = Alerter::new(config.webhook_url.clone());
        let status_log = StatusLog::new(&config.logs_dir);
        let post_log = PostLog::new(&config.logs_dir);

        Ok(Self {
            config,
            fetcher,
            browser,
            alerter,
            status_log,
            post_log,
            state: Arc::new(Mutex::new(MonitorState {
                last_results: HashMap::new(),
            })),
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            "RTI Pulse engine active, checking every {}s",
            self.config.check_interval
        );

        loop {
            let start = Utc::now();
            // Fresh read every cycle so dashboard edits show up immediately.
            let sites = config::load_sites(&self.config.sites_file);
            if sites.is_empty() {
                warn!("No portals configured in {}", self.config.sites_file);
            }

            let total = sites.len();
            let results = self.check_all(sites).await;

            let mut up = 0usize;
            let mut down = Vec::new();
            for result in results {
                if result.functional {
                    up += 1;
                } else {
                    down.push(result.clone());
                }
                self.process_result(result).await;
            }

            self.dispatch_alerts(&down).await;

            let duration = Utc::now() - start;
            info!(
                "Cycle completed {} checks in {:.2}s: {} up, {} down",
                total,
                duration.num_milliseconds() as f64 / 1000.0,
                up,
                down.len()
            );

            tokio::time::sleep(Duration::from_secs(self.config.check_interval)).await;
        }
    }

    pub async fn check_all(self: &Arc<Self>, sites: Vec<MonitoredSite>) -> Vec<CheckResult> {
        let mut tasks = FuturesUnordered::new();
        for site in sites {
            let monitor = Arc::clone(self);
            tasks.push(tokio::spawn(async move { monitor.check_site(site).await }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(join_res) = tasks.next().await {
            match join_res {
                Ok(result) => results.push(result),
                Err(e) => error!("Check task failed: {}", e),
            }
        }
        results
    }

    pub async fn check_site(&self, site: MonitoredSite) -> CheckResult {
        match self.fetcher.fetch(&site.url).await {
            FetchOutcome::Response { status, body } => {
                self.judge_response(site, status, body).await
            }
            FetchOutcome::Transport(err) if err.needs_escalation() => self.escalate(site).await,
            FetchOutcome::Transport(err) => {
                let reason = err.to_string();
                let evidence = self.browser.capture(&site, &reason).await;
                CheckResult::down(site, None, reason, evidence)
            }
        }
    }

    async fn judge_response(&self, site: MonitoredSite, status: u16, body: String) -> CheckResult {
        if classify::can_user_apply(&body, Some(status)) {
            return CheckResult::up(site, Some(status));
        }

        let reason = classify::failure_reason(&body, Some(status));
        let evidence = self.browser.capture(&site, &reason).await;
        CheckResult::down(site, Some(status), reason, evidence)
    }

    // Some portals answer with framing a strict HTTP client rejects but a
    // real browser tolerates; the rendered DOM gets the final say.
    async fn escalate(&self, site: MonitoredSite) -> CheckResult {
        match self.browser.render(&site.url).await {
            Ok(html) if classify::can_user_apply(&html, Some(200)) => {
                CheckResult::up(site, Some(200))
            }
            Ok(_) => {
                let reason = "Page Not Functional";
                let evidence = self.browser.capture(&site, reason).await;
                CheckResult::down(site, Some(200), reason, evidence)
            }
            Err(e) => {
                warn!("Browser fallback could not load {}: {}", site.url, e);
                let reason = "Page Not Loading";
                let evidence = self.browser.capture(&site, reason).await;
                CheckResult::down(site, None, reason, evidence)
            }
        }
    }

    async fn process_result(&self, result: CheckResult) {
        if let Err(e) = self.status_log.append(
            &result.site.url,
            result.http_status,
            result.failure_reason.as_deref(),
            result.checked_at,
        ) {
            warn!("Could not persist status for {}: {}", result.site.url, e);
        }

        let new_status = result.status();
        let mut state = self.state.lock().await;
        let old_status = state
            .last_results
            .get(&result.site.url)
            .map(|r| r.status());
        state
            .last_results
            .insert(result.site.url.clone(), result.clone());
        drop(state);

        match old_status {
            Some(old) if old != new_status => {
                let msg = format!(
                    "[CHANGE] {} ({}) -> {:?}",
                    result.site.name, result.site.url, new_status
                );
                if new_status == Status::Down {
                    error!("{}", msg);
                } else {
                    warn!("{}", msg);
                }
            }
            None if new_status == Status::Down => {
                error!(
                    "[DOWN] {} ({}): {}",
                    result.site.name,
                    result.site.url,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
            _ => {}
        }
    }

    async fn dispatch_alerts(&self, down: &[CheckResult]) {
        if !self.alerter.enabled() || down.is_empty() {
            return;
        }

        let mut first = true;
        for result in down {
            if let Some(last) = self.post_log.last_success_time(&result.site.url) {
                if Utc::now() - last < chrono::Duration::hours(ALERT_COOLDOWN_HOURS) {
                    info!("Alert for {} suppressed (cooldown)", result.site.name);
                    continue;
                }
            }

            if !first {
                tokio::time::sleep(INTER_SEND_DELAY).await;
            }
            first = false;

            let message = Alerter::render_message(result);
            match self.alerter.notify_down(result).await {
                Ok(()) => {
                    info!("Alert sent for {}", result.site.name);
                    if let Err(e) =
                        self.post_log.append(&result.site.url, &message, "success", None)
                    {
                        warn!("Could not record alert for {}: {}", result.site.url, e);
                    }
                }
                Err(e) => {
                    warn!("Alert for {} failed: {}", result.site.name, e);
                    if let Err(log_err) = self.post_log.append(
                        &result.site.url,
                        &message,
                        "failed",
                        Some(&e.to_string()),
                    ) {
                        warn!("Could not record alert for {}: {}", result.site.url, log_err);
                    }
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        self.browser.close_all().await;
    }
}
