use std::time::{Duration, Instant};

use crate::backend::{BackendError, BackendErrorKind, ViewportBackend};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pings `backend`, failing closed when no answer arrives within `timeout`.
///
/// Returns the round-trip latency. Any failure is reported as a connectivity
/// error.
pub async fn probe_connection<B>(backend: &B, timeout: Duration) -> Result<Duration, BackendError>
where
    B: ViewportBackend + ?Sized,
{
    let started_at = Instant::now();
    let outcome = match tokio::time::timeout(timeout, backend.ping()).await {
        Ok(Ok(())) => Ok(started_at.elapsed()),
        Ok(Err(error)) if error.kind() == BackendErrorKind::Connectivity => Err(error),
        Ok(Err(error)) => Err(BackendError::connectivity(error.message())),
        Err(_) => Err(BackendError::connectivity(format!(
            "{} server did not answer within {}s",
            backend.kind(),
            timeout.as_secs()
        ))),
    };

    match &outcome {
        Ok(latency) => tracing::info!(
            backend = %backend.kind(),
            latency_ms = latency.as_millis(),
            "connectivity probe succeeded"
        ),
        Err(error) => tracing::warn!(backend = %backend.kind(), %error, "connectivity probe failed"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::probe_connection;
    use crate::backend::{BackendError, BackendErrorKind, RowSet, ViewportBackend};
    use crate::dialect::BackendKind;

    #[derive(Debug)]
    enum PingBehavior {
        Answer,
        Fail,
        Hang,
    }

    #[derive(Debug)]
    struct PingBackend(PingBehavior);

    #[async_trait]
    impl ViewportBackend for PingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Mysql
        }

        async fn count_rows(&self, _sql: &str) -> Result<u64, BackendError> {
            Ok(0)
        }

        async fn fetch_rows(&self, _sql: &str) -> Result<RowSet, BackendError> {
            Ok(RowSet::default())
        }

        async fn execute_update(&self, _sql: &str, _params: &[String]) -> Result<u64, BackendError> {
            Ok(0)
        }

        async fn ping(&self) -> Result<(), BackendError> {
            match self.0 {
                PingBehavior::Answer => Ok(()),
                PingBehavior::Fail => Err(BackendError::query("server has gone away")),
                PingBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    async fn answered_ping_reports_latency() {
        let latency = probe_connection(&PingBackend(PingBehavior::Answer), Duration::from_secs(1))
            .await
            .expect("probe should succeed");
        assert!(latency < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn ping_failures_become_connectivity_errors() {
        let error = probe_connection(&PingBackend(PingBehavior::Fail), Duration::from_secs(1))
            .await
            .expect_err("probe should fail");
        assert_eq!(error.kind(), BackendErrorKind::Connectivity);
        assert_eq!(error.message(), "server has gone away");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_ping_fails_closed_after_timeout() {
        let error = probe_connection(&PingBackend(PingBehavior::Hang), Duration::from_secs(10))
            .await
            .expect_err("probe should time out");
        assert_eq!(error.kind(), BackendErrorKind::Connectivity);
        assert!(error.message().contains("10s"));
    }
}
