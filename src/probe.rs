// Readiness Prober.
//
// Polls the ping route until it answers 200 or the attempt budget runs out.
// Connection refused, timeouts and non-200 statuses are retried with exponential
// backoff. Any other transport failure is returned to the caller as-is.

use std::time::Duration;

use crate::config::ProbeConfig;
use crate::error::LaunchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessResult {
    pub ready: bool,
    pub attempts: u32,
    pub last_failure: Option<String>,
}

enum Attempt {
    Ready,
    Retry(String),
}

pub struct Prober<'a> {
    config: &'a ProbeConfig,
    client: reqwest::Client,
}

impl<'a> Prober<'a> {
    pub fn new(config: &'a ProbeConfig) -> Result<Self, LaunchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .no_proxy()
            .build()
            .map_err(|e| LaunchError::Transport {
                url: config.url(0),
                source: anyhow::anyhow!("HTTP client init failed: {}", e),
            })?;
        Ok(Self { config, client })
    }

    /// Delay before attempt `n + 1`, given that attempt `n` (1-based) just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .config
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.max_backoff_ms);
        Duration::from_millis(delay)
    }

    pub async fn await_ready(&self, port: u16) -> Result<ReadinessResult, LaunchError> {
        let url = self.config.url(port);
        let mut last_failure = None;

        for attempt in 1..=self.config.max_attempts {
            match self.attempt(&url).await? {
                Attempt::Ready => {
                    tracing::info!(%url, attempt, "Server is ready");
                    return Ok(ReadinessResult {
                        ready: true,
                        attempts: attempt,
                        last_failure: None,
                    });
                }
                Attempt::Retry(reason) => {
                    tracing::debug!(%url, attempt, %reason, "Server not ready yet");
                    last_failure = Some(reason);
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        tracing::warn!(%url, attempts = self.config.max_attempts, "Server never became ready");
        Ok(ReadinessResult {
            ready: false,
            attempts: self.config.max_attempts,
            last_failure,
        })
    }

    async fn attempt(&self, url: &str) -> Result<Attempt, LaunchError> {
        match self.client.get(url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => Ok(Attempt::Ready),
            Ok(response) => Ok(Attempt::Retry(format!("status {}", response.status()))),
            Err(e) if e.is_connect() => Ok(Attempt::Retry(format!("connection failed: {}", e))),
            Err(e) if e.is_timeout() => Ok(Attempt::Retry(format!("timed out: {}", e))),
            Err(e) => Err(LaunchError::Transport {
                url: url.to_string(),
                source: e.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_attempts: u32) -> ProbeConfig {
        ProbeConfig {
            host: "127.0.0.1".into(),
            max_attempts,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            request_timeout_ms: 500,
            ..ProbeConfig::default()
        }
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Serve the ping route; the first `failures` hits answer 503.
    async fn ping_server(failures: u32) -> (u16, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/__mockd_ping",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (port, hits)
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let (port, hits) = ping_server(0).await;
        let config = fast_config(5);
        let result = Prober::new(&config).unwrap().await_ready(port).await.unwrap();

        assert!(result.ready);
        assert_eq!(result.attempts, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "No extra retries after success");
    }

    #[tokio::test]
    async fn test_retries_non_200_until_ready() {
        let (port, hits) = ping_server(2).await;
        let config = fast_config(5);
        let result = Prober::new(&config).unwrap().await_ready(port).await.unwrap();

        assert!(result.ready);
        assert_eq!(result.attempts, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_listener_is_retried_as_connection_failure() {
        let config = fast_config(3);
        let result = Prober::new(&config)
            .unwrap()
            .await_ready(closed_port())
            .await
            .unwrap();

        assert!(!result.ready);
        assert!(result.last_failure.unwrap().contains("connection failed"));
    }

    #[tokio::test]
    async fn test_unanswered_requests_exhaust_exact_attempt_budget() {
        // Accepts connections and never replies, so every request times out.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicU32::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let config = ProbeConfig {
            request_timeout_ms: 100,
            ..fast_config(3)
        };
        let result = Prober::new(&config).unwrap().await_ready(port).await.unwrap();

        assert!(!result.ready);
        assert_eq!(result.attempts, 3);
        assert_eq!(accepted.load(Ordering::SeqCst), 3, "One connection per attempt, no more");
        assert!(result.last_failure.unwrap().starts_with("timed out"));
    }

    #[tokio::test]
    async fn test_persistent_non_200_is_not_ready() {
        let (port, hits) = ping_server(u32::MAX).await;
        let config = fast_config(4);
        let result = Prober::new(&config).unwrap().await_ready(port).await.unwrap();

        assert!(!result.ready);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(result.last_failure.as_deref(), Some("status 503 Service Unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_transport_error() {
        // A listener that answers with garbage instead of HTTP.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(b"this is not http\r\n\r\n").await;
            }
        });

        let config = fast_config(3);
        let err = Prober::new(&config)
            .unwrap()
            .await_ready(port)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Transport);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ProbeConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            ..ProbeConfig::default()
        };
        let prober = Prober::new(&config).unwrap();
        assert_eq!(prober.backoff(1), Duration::from_millis(100));
        assert_eq!(prober.backoff(2), Duration::from_millis(200));
        assert_eq!(prober.backoff(3), Duration::from_millis(350));
        assert_eq!(prober.backoff(40), Duration::from_millis(350));
    }
}
