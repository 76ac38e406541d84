//! Command transport for hosts
//!
//! A transport executes shell commands on a host, optionally with privilege
//! escalation. The engine never looks inside an [`Escalation`]; it only
//! resolves which variant applies and hands it to the module.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

mod cancel;
mod local;
mod none;

pub use cancel::CancellationToken;
pub use local::LocalTransport;
pub use none::NoneTransport;

/// How a command should be escalated
#[derive(Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Escalate as the connecting user using its own secret
    AsSelf { secret: Option<String> },
    /// Escalate while impersonating another user
    Impersonate {
        user: String,
        secret: Option<String>,
    },
}

impl Escalation {
    pub fn secret(&self) -> Option<&str> {
        match self {
            Escalation::AsSelf { secret } | Escalation::Impersonate { secret, .. } => {
                secret.as_deref()
            }
        }
    }

    pub fn user(&self) -> Option<&str> {
        match self {
            Escalation::AsSelf { .. } => None,
            Escalation::Impersonate { user, .. } => Some(user),
        }
    }
}

// Secrets never end up in logs.
impl fmt::Debug for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = |s: &Option<String>| if s.is_some() { "<redacted>" } else { "<none>" };
        match self {
            Escalation::AsSelf { secret: s } => f
                .debug_struct("AsSelf")
                .field("secret", &secret(s))
                .finish(),
            Escalation::Impersonate { user, secret: s } => f
                .debug_struct("Impersonate")
                .field("user", user)
                .field("secret", &secret(s))
                .finish(),
        }
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{kind} transport does not support command execution")]
    Unsupported { kind: &'static str },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command was cancelled")]
    Cancelled,

    #[error("transport is closed")]
    Closed,
}

/// Executes commands on one host
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name of the transport kind, e.g. `local`
    fn kind(&self) -> &'static str;

    /// Run `command` through the host's shell
    async fn execute(
        &self,
        command: &str,
        escalation: Option<&Escalation>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, TransportError>;

    /// Release the connection; further commands fail with [`TransportError::Closed`]
    async fn close(&self) -> Result<(), TransportError>;
}
