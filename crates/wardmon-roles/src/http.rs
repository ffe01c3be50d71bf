//! HTTP and HTTPS content probes
//!
//! Each target is a URL plus a pre-compiled pattern. Fetches run on a
//! bounded pool of concurrent workers; a probe records `true` only when
//! the body of the response matches its pattern, and any transport
//! failure records `false` rather than surfacing an error.

use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};
use wardmon_core::{Error, ProbeOutcome, Result, StatsSnapshot};

/// Concurrent fetch workers per cycle
pub const HTTP_WORKERS: usize = 5;
/// Per-request timeout
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Wall-clock budget for the whole HTTP phase of a cycle
pub const HTTP_PHASE_BUDGET: Duration = Duration::from_secs(10);

/// One configured HTTP target
#[derive(Debug, Clone)]
pub struct HttpTarget {
    pub name: String,
    pub url: String,
    pub pattern: Regex,
}

/// Bounded-concurrency prober shared across cycles
pub struct HttpProber {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(HTTP_WORKERS)),
        })
    }

    /// Fetch every target once and collect the verdicts
    ///
    /// Targets still in flight when the phase budget runs out are
    /// recorded as `false`, the same as a failed fetch.
    pub async fn run_cycle(&self, targets: &[HttpTarget]) -> StatsSnapshot {
        let deadline = Instant::now() + HTTP_PHASE_BUDGET;

        // Failure is the default; completed fetches overwrite it.
        let mut snapshot: StatsSnapshot = targets
            .iter()
            .map(|t| (t.name.clone(), ProbeOutcome::Matched(false)))
            .collect();

        let mut workers = JoinSet::new();
        for target in targets.iter().cloned() {
            let client = self.client.clone();
            let permits = Arc::clone(&self.permits);
            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (target.name, false);
                };
                let matched = fetch_and_match(&client, &target).await;
                (target.name, matched)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, workers.join_next()).await {
                Ok(Some(Ok((name, matched)))) => {
                    snapshot.insert(name, ProbeOutcome::Matched(matched));
                }
                Ok(Some(Err(e))) => warn!("HTTP worker panicked: {}", e),
                Ok(None) => break,
                Err(_) => {
                    let unfinished = workers.len();
                    if unfinished > 0 {
                        warn!("HTTP phase budget elapsed with {} fetches unfinished", unfinished);
                    }
                    workers.abort_all();
                    break;
                }
            }
        }

        snapshot
    }
}

async fn fetch_and_match(client: &reqwest::Client, target: &HttpTarget) -> bool {
    match client.get(&target.url).send().await {
        Ok(response) => match response.text().await {
            Ok(body) => {
                let matched = target.pattern.is_match(&body);
                debug!("fetched {} ({} bytes), match: {}", target.url, body.len(), matched);
                matched
            }
            Err(e) => {
                debug!("reading body from {} failed: {}", target.url, e);
                false
            }
        },
        Err(e) => {
            debug!("fetch of {} failed: {}", target.url, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn target(name: &str, url: String, pattern: &str) -> HttpTarget {
        HttpTarget {
            name: name.to_string(),
            url,
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_body_match_records_true() {
        let url = serve_once("service says ok").await;
        let prober = HttpProber::new().unwrap();

        let snapshot = prober.run_cycle(&[target("x", url, "ok")]).await;
        assert_eq!(snapshot["x"], ProbeOutcome::Matched(true));
    }

    #[tokio::test]
    async fn test_body_mismatch_records_false() {
        let url = serve_once("service says fail").await;
        let prober = HttpProber::new().unwrap();

        let snapshot = prober.run_cycle(&[target("x", url, "^ok$")]).await;
        assert_eq!(snapshot["x"], ProbeOutcome::Matched(false));
    }

    #[tokio::test]
    async fn test_transport_error_records_false() {
        // Nothing listens here; connection is refused immediately.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new().unwrap();
        let snapshot = prober
            .run_cycle(&[target("dead", format!("http://{}/", addr), "ok")])
            .await;
        assert_eq!(snapshot["dead"], ProbeOutcome::Matched(false));
    }

    #[tokio::test]
    async fn test_one_entry_per_target() {
        let url_a = serve_once("alpha").await;
        let url_b = serve_once("beta").await;
        let prober = HttpProber::new().unwrap();

        let snapshot = prober
            .run_cycle(&[target("a", url_a, "alpha"), target("b", url_b, "nope")])
            .await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], ProbeOutcome::Matched(true));
        assert_eq!(snapshot["b"], ProbeOutcome::Matched(false));
    }
}
