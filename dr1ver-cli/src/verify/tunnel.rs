//! Structured port tunnel
//!
//! The verifier owns the tunnel child exclusively; `shutdown` kills and
//! reaps it, and `kill_on_drop` covers every other exit path.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

pub struct Tunnel {
    child: Child,
    local_port: u16,
}

impl Tunnel {
    /// Forward `127.0.0.1:local_port` to `pod:remote_port` via kubectl.
    pub fn open(
        kubeconfig: &Path,
        namespace: &str,
        pod: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<Self> {
        let mut command = Command::new("kubectl");
        command
            .arg("--kubeconfig")
            .arg(kubeconfig)
            .arg("--namespace")
            .arg(namespace)
            .arg("port-forward")
            .arg(pod)
            .arg(format!("{local_port}:{remote_port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Self::spawn(command, local_port)
    }

    pub(crate) fn spawn(mut command: Command, local_port: u16) -> Result<Self> {
        command.kill_on_drop(true);
        let child = command.spawn().context("failed to spawn port tunnel")?;
        Ok(Self { child, local_port })
    }

    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}/healthz", self.local_port)
    }

    pub fn metrics_url(&self) -> String {
        format!("http://127.0.0.1:{}/metrics", self.local_port)
    }

    /// Kill and reap; harmless against an already-dead child.
    pub async fn shutdown(mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}
