//! signal-cli driven as a child process, one invocation per call.
//!
//! Poll only: every `receive` runs
//! `signal-cli --output json [--config DIR] -u ACCOUNT receive --timeout T --max-messages N`
//! and parses the line-delimited JSON it prints.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use relay_proto::rpc::extract_challenge;
use relay_proto::{EventRecord, RateLimit};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::debug;

use super::Relay;
use crate::error::RelayError;

pub struct CliRelay {
    program: String,
    config_dir: Option<String>,
}

impl CliRelay {
    pub fn new(program: &str, config_dir: Option<&str>) -> Self {
        Self {
            program: program.to_string(),
            config_dir: config_dir.map(str::to_string),
        }
    }

    fn command(&self, account: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--output", "json"]);
        if let Some(dir) = &self.config_dir {
            cmd.arg("--config").arg(dir);
        }
        cmd.arg("-u").arg(account);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

/// Classify a failed invocation by its stderr.
fn failure(status: std::process::ExitStatus, stderr: &str) -> RelayError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("rate limit") || lower.contains("ratelimit") || lower.contains("captcha") {
        let challenge = extract_challenge(&Value::String(stderr.to_string()));
        let wait_seconds = lower
            .split("retry after ")
            .nth(1)
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|n| n.parse().ok());
        return RelayError::RateLimited(RateLimit {
            challenge,
            options: Vec::new(),
            wait_seconds,
        });
    }
    RelayError::Transport(format!("signal-cli exited with {status}: {}", stderr.trim()))
}

#[async_trait]
impl Relay for CliRelay {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn send(&self, account: &str, group_id: &str, message: &str) -> Result<(), RelayError> {
        let output = self
            .command(account)
            .args(["send", "-g", group_id, "-m", message])
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failure(output.status, &String::from_utf8_lossy(&output.stderr)))
        }
    }

    async fn receive(
        &self,
        account: &str,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<EventRecord>, RelayError> {
        let mut child = self
            .command(account)
            .arg("receive")
            .arg("--timeout")
            .arg(timeout.as_secs().to_string())
            .arg("--max-messages")
            .arg(max_messages.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let mut records = Vec::new();
        let mut read_error = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        read_error = Some(RelayError::Transport(format!("reading output: {e}")));
                        break;
                    }
                };
                match EventRecord::parse_line(&line) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "ignoring non-JSON output line"),
                }
            }
        }

        // Stdout is closed or abandoned; stop the child before reaping it.
        if read_error.is_some() {
            let _ = child.start_kill();
        }
        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if let Some(e) = read_error {
            debug!(%status, stderr = stderr.trim(), "signal-cli output unreadable");
            return Err(e);
        }
        if !status.success() && records.is_empty() {
            return Err(failure(status, &stderr));
        }
        Ok(records)
    }
}
