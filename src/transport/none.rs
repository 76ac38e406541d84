use async_trait::async_trait;

use super::{CancellationToken, CommandOutput, Escalation, Transport, TransportError};

/// Transport for hosts that only run modules needing no commands
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneTransport;

#[async_trait]
impl Transport for NoneTransport {
    fn kind(&self) -> &'static str {
        "none"
    }

    async fn execute(
        &self,
        _command: &str,
        _escalation: Option<&Escalation>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutput, TransportError> {
        Err(TransportError::Unsupported { kind: self.kind() })
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
