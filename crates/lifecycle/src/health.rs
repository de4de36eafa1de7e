use std::time::Duration;

use async_trait::async_trait;
use manager_core::Endpoint;

/// One health check against a worker endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> bool;
}

/// `GET /` on the worker; any 2xx counts as healthy.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, endpoint: &Endpoint) -> bool {
        match self.client.get(endpoint.health_url()).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::trace!(endpoint = %endpoint, error = %err, "health probe failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not healthy after {attempts} attempts")]
pub struct HealthTimeout {
    pub attempts: u32,
}

/// Probe up to `max_attempts` times, sleeping `interval` between failures.
/// Returns the 1-based attempt that succeeded.
pub async fn poll_health(
    probe: &dyn HealthProbe,
    endpoint: &Endpoint,
    interval: Duration,
    max_attempts: u32,
) -> Result<u32, HealthTimeout> {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if probe.check(endpoint).await {
            return Ok(attempt);
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(HealthTimeout {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails until the `succeed_on`-th call.
    struct Scripted {
        calls: AtomicU32,
        succeed_on: Option<u32>,
    }

    #[async_trait]
    impl HealthProbe for Scripted {
        async fn check(&self, _endpoint: &Endpoint) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.succeed_on.is_some_and(|n| call >= n)
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("http://127.0.0.1:8001")
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_immediately() {
        let probe = Scripted {
            calls: AtomicU32::new(0),
            succeed_on: Some(1),
        };
        let started = tokio::time::Instant::now();
        let attempt = poll_health(&probe, &endpoint(), Duration::from_secs(1), 30)
            .await
            .unwrap();
        assert_eq!(attempt, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_failed_attempts() {
        let probe = Scripted {
            calls: AtomicU32::new(0),
            succeed_on: Some(4),
        };
        let started = tokio::time::Instant::now();
        let attempt = poll_health(&probe, &endpoint(), Duration::from_secs(1), 30)
            .await
            .unwrap();
        assert_eq!(attempt, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bound() {
        let probe = Scripted {
            calls: AtomicU32::new(0),
            succeed_on: None,
        };
        let started = tokio::time::Instant::now();
        let err = poll_health(&probe, &endpoint(), Duration::from_secs(1), 30)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 30);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 30);
        // No sleep after the last attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(29));
    }

    #[tokio::test]
    async fn http_probe_against_loopback_worker() {
        let app = axum::Router::new().route("/", axum::routing::get(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let probe = HttpHealthProbe::new(Duration::from_secs(2)).unwrap();
        assert!(probe.check(&Endpoint::new(format!("http://{}", addr))).await);

        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed = Endpoint::new(format!("http://{}", unused.local_addr().unwrap()));
        drop(unused);
        assert!(!probe.check(&closed).await);
    }
}
