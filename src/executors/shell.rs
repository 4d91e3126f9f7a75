use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::handler::TaskHandler;

/// Runs a local command and fails the task when it exits non-zero.
#[derive(Debug, Default)]
pub struct ShellExecutor;

#[derive(Debug, Deserialize)]
struct ShellPayload {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

#[async_trait]
impl TaskHandler for ShellExecutor {
    async fn execute(&self, payload: &[u8]) -> anyhow::Result<()> {
        let payload: ShellPayload =
            serde_json::from_slice(payload).context("invalid shell payload")?;
        if payload.command.is_empty() {
            bail!("command is required");
        }

        let output = Command::new(&payload.command)
            .args(&payload.args)
            .output()
            .await
            .with_context(|| format!("failed to spawn {:?}", payload.command))?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            bail!(
                "{:?} exited with {}: {}",
                payload.command,
                output.status,
                combined.trim()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    #[tokio::test]
    async fn runs_a_successful_command() {
        let payload = br#"{"command": "true"}"#;
        assert_ok!(ShellExecutor.execute(payload).await);
    }

    #[tokio::test]
    async fn reports_non_zero_exits() {
        let payload = br#"{"command": "false"}"#;
        assert_err!(ShellExecutor.execute(payload).await);
    }

    #[tokio::test]
    async fn rejects_an_empty_command() {
        let payload = br#"{"command": ""}"#;
        let error = ShellExecutor.execute(payload).await.unwrap_err();
        assert!(error.to_string().contains("command is required"));
    }

    #[tokio::test]
    async fn rejects_malformed_payloads() {
        assert_err!(ShellExecutor.execute(b"not json").await);
    }
}
