//! Background reachability probe that aborts a stream when the endpoint host goes away.

use std::time::Duration;

use reqwest::Url;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::controller::StreamHandle;
use crate::error::CancelReason;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Consecutive failed probes before the connection is declared lost.
const FAILURES_BEFORE_LOST: u32 = 2;

fn probe_target(base_url: &str) -> Option<(String, u16)> {
    let url = Url::parse(base_url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

async fn reachable(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Probe `base_url` every `interval` until `handle` is cancelled. Two failed
/// probes in a row cancel it with [`CancelReason::ConnectionLost`].
///
/// Returns `None` when the URL has no probeable host.
pub fn watch(base_url: &str, handle: StreamHandle, interval: Duration) -> Option<JoinHandle<()>> {
    let (host, port) = probe_target(base_url)?;
    Some(tokio::spawn(async move {
        let mut failures = 0;
        loop {
            tokio::select! {
                _ = handle.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if reachable(&host, port).await {
                failures = 0;
                continue;
            }
            failures += 1;
            debug!(%host, port, failures, "endpoint probe failed");
            if failures >= FAILURES_BEFORE_LOST {
                warn!(%host, port, "endpoint unreachable, cancelling stream");
                handle.cancel(CancelReason::ConnectionLost);
                return;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[test]
    fn test_probe_target_defaults_port() {
        assert_eq!(probe_target("https://api.example.com/v1"), Some(("api.example.com".into(), 443)));
        assert_eq!(probe_target("http://localhost:8080/v1"), Some(("localhost".into(), 8080)));
        assert_eq!(probe_target("not a url"), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_cancels_with_connection_lost() {
        let handle = StreamHandle::new();
        let watcher = watch("http://127.0.0.1:9", handle.clone(), Duration::from_millis(10)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.cancelled()).await.unwrap();
        assert_eq!(handle.reason(), Some(CancelReason::ConnectionLost));
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_reachable_host_leaves_stream_alone() {
        let server = MockServer::start();
        let handle = StreamHandle::new();
        let watcher = watch(&server.base_url(), handle.clone(), Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_cancelled());

        handle.cancel(CancelReason::User);
        watcher.await.unwrap();
        assert_eq!(handle.reason(), Some(CancelReason::User));
    }
}
