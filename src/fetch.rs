use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::CheckerConfig;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Timeout")]
    Timeout,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Malformed HTTP response")]
    MalformedResponse,
    #[error("TLS anomaly")]
    TlsAnomaly,
    #[error("{0}")]
    Unknown(String),
}

impl ProbeError {
    // The two cases where a raw HTTP client can misreport a page that a
    // real browser renders fine.
    pub fn needs_escalation(&self) -> bool {
        matches!(self, ProbeError::MalformedResponse | ProbeError::TlsAnomaly)
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Response { status: u16, body: String },
    Transport(ProbeError),
}

pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl Fetcher {
    pub fn new(cfg: &CheckerConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        // The portals routinely present broken certificate chains; a TLS
        // failure must not count as the site being down.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            max_retries: cfg.max_retries.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
        })
    }

    /// Probe a URL. Any obtained status and body is a normal outcome no
    /// matter the status code; only transport failures are retried, and the
    /// final attempt's failure is what gets reported.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut last_error = ProbeError::Unknown("no attempt made".into());

        for attempt in 1..=self.max_retries {
            match self.attempt(url).await {
                Ok((status, body)) => return FetchOutcome::Response { status, body },
                Err(err) => {
                    debug!("Attempt {}/{} for {} failed: {}", attempt, self.max_retries, url, err);
                    last_error = err;
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        FetchOutcome::Transport(last_error)
    }

    async fn attempt(&self, url: &str) -> Result<(u16, String), ProbeError> {
        let response = self.client.get(url).send().await.map_err(classify_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_error)?;
        Ok((status, body))
    }
}

// Structured predicates first; the source-chain text scan only covers what
// reqwest does not expose as a predicate.
fn classify_error(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::Timeout;
    }

    let chain = error_chain_text(&err).to_lowercase();
    if chain.contains("certificate")
        || chain.contains("tls")
        || chain.contains("ssl")
        || chain.contains("handshake")
    {
        return ProbeError::TlsAnomaly;
    }
    if err.is_connect() {
        return ProbeError::ConnectionFailed;
    }
    if err.is_decode()
        || chain.contains("parse")
        || chain.contains("malformed")
        || chain.contains("chunk")
        || chain.contains("invalid header")
    {
        return ProbeError::MalformedResponse;
    }

    ProbeError::Unknown(err.to_string())
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(timeout_ms: u64, max_retries: u32) -> Fetcher {
        Fetcher::new(&CheckerConfig {
            request_timeout_ms: timeout_ms,
            max_retries,
            retry_delay_ms: 10,
            browser_timeout_ms: timeout_ms,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn non_2xx_response_is_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal server error"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = fetcher(5_000, 3).fetch(&server.uri()).await;
        match outcome {
            FetchOutcome::Response { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("internal server error"));
            }
            FetchOutcome::Transport(err) => panic!("unexpected transport error: {err}"),
        }
    }

    #[tokio::test]
    async fn success_body_is_handed_through_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>rti application portal</body></html>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = fetcher(5_000, 2).fetch(&server.uri()).await;
        match outcome {
            FetchOutcome::Response { status, body } => {
                assert_eq!(status, 200);
                assert!(body.contains("rti application"));
            }
            FetchOutcome::Transport(err) => panic!("unexpected transport error: {err}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_retried_up_to_the_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(10)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let outcome = fetcher(200, 2).fetch(&server.uri()).await;
        match outcome {
            FetchOutcome::Transport(err) => assert_eq!(err, ProbeError::Timeout),
            FetchOutcome::Response { status, .. } => panic!("unexpected response: {status}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_reports_connection_failed() {
        // Bind then drop to get a port nothing is listening on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let outcome = fetcher(2_000, 2)
            .fetch(&format!("http://127.0.0.1:{port}/"))
            .await;
        match outcome {
            FetchOutcome::Transport(err) => assert_eq!(err, ProbeError::ConnectionFailed),
            FetchOutcome::Response { status, .. } => panic!("unexpected response: {status}"),
        }
    }

    #[test]
    fn terminal_labels_are_human_readable() {
        assert_eq!(ProbeError::Timeout.to_string(), "Timeout");
        assert_eq!(ProbeError::ConnectionFailed.to_string(), "Connection failed");
        assert_eq!(
            ProbeError::MalformedResponse.to_string(),
            "Malformed HTTP response"
        );
        assert_eq!(
            ProbeError::Unknown("tcp reset by peer".into()).to_string(),
            "tcp reset by peer"
        );
    }

    #[test]
    fn only_ambiguous_transport_failures_escalate() {
        assert!(ProbeError::MalformedResponse.needs_escalation());
        assert!(ProbeError::TlsAnomaly.needs_escalation());
        assert!(!ProbeError::Timeout.needs_escalation());
        assert!(!ProbeError::ConnectionFailed.needs_escalation());
        assert!(!ProbeError::Unknown("boom".into()).needs_escalation());
    }
}
