use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use super::{CancellationToken, CommandOutput, Escalation, Transport, TransportError};

/// Runs commands on the local machine with `sh -c`
///
/// Escalated commands are wrapped in `sudo -S -p ''`, with the secret fed on
/// stdin.
#[derive(Debug, Default)]
pub struct LocalTransport {
    closed: AtomicBool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program and arguments for a command under the given escalation
    fn command_line(command: &str, escalation: Option<&Escalation>) -> (String, Vec<String>) {
        let shell = vec!["-c".to_string(), command.to_string()];
        match escalation {
            None => ("sh".to_string(), shell),
            Some(escalation) => {
                let mut args = vec!["-S".to_string(), "-p".to_string(), String::new()];
                if let Some(user) = escalation.user() {
                    args.push("-u".to_string());
                    args.push(user.to_string());
                }
                args.push("sh".to_string());
                args.extend(shell);
                ("sudo".to_string(), args)
            }
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn execute(
        &self,
        command: &str,
        escalation: Option<&Escalation>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let (program, args) = Self::command_line(command, escalation);
        debug!("Executing local command: {} {}", program, args.join(" "));

        let mut child = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(if escalation.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let secret = escalation.and_then(|e| e.secret()).unwrap_or_default();
            stdin.write_all(format!("{secret}\n").as_bytes()).await?;
        }

        // Dropping the pending wait kills the child.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
        };

        let output = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!("Local command exited with {}", output.exit_code);
        Ok(output)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
