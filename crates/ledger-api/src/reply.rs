use std::fmt;

#[derive(Debug)]
pub struct UpstreamError {
    pub message: String,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream reply failed: {}", self.message)
    }
}

impl std::error::Error for UpstreamError {}

/// Outbound side of the messaging webhook. Delivery failures surface here and
/// are logged by the caller; they never fail the inbound webhook response.
pub trait ReplyTransport: Send + Sync {
    fn send_reply(&self, user_id: &str, text: &str) -> Result<(), UpstreamError>;
}

/// Default transport: logs the reply instead of calling a messaging provider.
#[derive(Debug, Default)]
pub struct LogOnlyReplyTransport;

impl ReplyTransport for LogOnlyReplyTransport {
    fn send_reply(&self, user_id: &str, text: &str) -> Result<(), UpstreamError> {
        tracing::info!(user_id, text, "reply transport (log only)");
        Ok(())
    }
}
