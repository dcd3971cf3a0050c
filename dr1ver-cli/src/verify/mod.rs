//! Migration verification
//!
//! Tunnel to the controller metrics endpoint, wait for it to answer, and
//! look for evidence of which provisioning path handled requests.

mod metrics;
mod tunnel;

pub use metrics::{scan_signal, MigrationSignal};
pub use tunnel::Tunnel;

use crate::config::RunConfig;
use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use regex::Regex;
use std::time::{Duration, Instant};

pub async fn verify(cfg: &RunConfig) -> Result<MigrationSignal> {
    let csi = Regex::new(&cfg.csi_metric_pattern).context("invalid csi metric pattern")?;
    let legacy = Regex::new(&cfg.legacy_metric_pattern).context("invalid legacy metric pattern")?;

    let node = resolve_node(cfg).await?;
    let pod = format!("{}-{node}", cfg.metrics_pod_prefix);
    tracing::debug!(%node, %pod, "scraping controller metrics");

    let tunnel = Tunnel::open(
        &cfg.kubeconfig_path(),
        &cfg.metrics_namespace,
        &pod,
        cfg.local_port,
        cfg.metrics_port,
    )?;
    let body = scrape_metrics(
        tunnel,
        Duration::from_secs(cfg.poll_interval_secs),
        Duration::from_secs(cfg.tunnel_timeout_secs),
    )
    .await?;

    Ok(scan_signal(&body, &csi, &legacy))
}

/// Scrape the metrics body through the tunnel. The tunnel dies on every
/// path out of here, whether or not the scrape succeeded.
async fn scrape_metrics(tunnel: Tunnel, interval: Duration, timeout: Duration) -> Result<String> {
    let result = async {
        wait_for_endpoint(&tunnel.health_url(), interval, timeout).await?;
        fetch_metrics(&tunnel.metrics_url()).await
    }
    .await;

    tunnel.shutdown().await;
    result
}

async fn resolve_node(cfg: &RunConfig) -> Result<String> {
    let kubeconfig =
        Kubeconfig::read_from(cfg.kubeconfig_path()).context("failed to read kubeconfig")?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("failed to load kubeconfig")?;
    let client = kube::Client::try_from(config)?;

    let nodes: Api<Node> = Api::all(client);
    let matched = nodes
        .list(&ListParams::default().labels(&cfg.node_selector))
        .await
        .context("failed to list nodes")?;
    matched
        .items
        .into_iter()
        .filter_map(|node| node.metadata.name)
        .next()
        .ok_or_else(|| anyhow!("no node matched label selector {:?}", cfg.node_selector))
}

/// Bounded readiness poll; a tunnel that never answers "ok" is fatal.
pub(crate) async fn wait_for_endpoint(
    url: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + timeout;
    loop {
        match client.get(url).send().await {
            Ok(response) => {
                if let Ok(body) = response.text().await {
                    if body.trim() == "ok" {
                        return Ok(());
                    }
                }
            }
            Err(err) => tracing::debug!(%url, %err, "tunnel not ready"),
        }
        if Instant::now() >= deadline {
            anyhow::bail!("tunnel to {url} not ready within {}s", timeout.as_secs());
        }
        tokio::time::sleep(interval).await;
    }
}

async fn fetch_metrics(url: &str) -> Result<String> {
    reqwest::Client::new()
        .get(url)
        .send()
        .await
        .context("metrics fetch failed")?
        .text()
        .await
        .context("metrics body unreadable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve(body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn endpoint_wait_succeeds_on_ok_body() {
        let port = serve("ok").await;
        let url = format!("http://127.0.0.1:{port}/healthz");
        wait_for_endpoint(&url, Duration::from_millis(10), Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn endpoint_wait_times_out_on_wrong_body() {
        let port = serve("almost ready").await;
        let url = format!("http://127.0.0.1:{port}/healthz");
        let result =
            wait_for_endpoint(&url, Duration::from_millis(10), Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn endpoint_wait_times_out_when_nothing_listens() {
        // Reserved-then-dropped port; nothing answers.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/healthz");
        let result =
            wait_for_endpoint(&url, Duration::from_millis(10), Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tunnel_is_torn_down_when_scraping_fails() {
        // Dead local port; the readiness poll can never succeed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut command = tokio::process::Command::new("sleep");
        command.arg("30");
        let tunnel = Tunnel::spawn(command, port).unwrap();

        let started = std::time::Instant::now();
        let result =
            scrape_metrics(tunnel, Duration::from_millis(10), Duration::from_millis(50)).await;
        assert!(result.is_err());
        // shutdown reaped the child by killing it, not by waiting out the sleep.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn metrics_fetch_returns_the_body() {
        let port = serve("metric_a 1\nmetric_b 2").await;
        let url = format!("http://127.0.0.1:{port}/metrics");
        let body = fetch_metrics(&url).await.unwrap();
        assert!(body.contains("metric_a"));
    }
}
