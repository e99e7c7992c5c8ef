pub mod chain;
pub mod config;
pub mod error;
pub mod factory;
pub mod group;
pub mod pipeline;
pub mod session;

use core::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use chain::{MessageChain, Segment};
pub use config::{ADMIN_SET, ErrorConfig, ParseAtConfig, PipelineConfig};
pub use error::PipelineError;
pub use group::GroupState;
pub use pipeline::Pipeline;
pub use session::{Session, SessionKind};

/// Delivery seam to the host transport.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, destination: &Session, chain: MessageChain) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepName {
    Mention,
    Error,
}

impl StepName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-facing outcome of one step. Never shown to end users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepResult {
    pub msg: Option<String>,
}

impl StepResult {
    pub fn with_msg(msg: impl Into<String>) -> Self {
        Self {
            msg: Some(msg.into()),
        }
    }
}

/// State of one outgoing message while it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct OutContext {
    pub session: Session,
    /// Who triggered the message; the probabilistic policy mentions them.
    pub sender_id: String,
    pub group: Arc<GroupState>,
    pub chain: MessageChain,
    suppressed: bool,
}

impl OutContext {
    pub fn new(
        session: Session,
        sender_id: impl Into<String>,
        group: Arc<GroupState>,
        chain: MessageChain,
    ) -> Self {
        Self {
            session,
            sender_id: sender_id.into(),
            group,
            chain,
            suppressed: false,
        }
    }

    #[must_use]
    pub fn plain(&self) -> String {
        self.chain.plain_text()
    }

    /// Replace the reply with plain text; empty text drops the reply.
    pub fn set_plain_result(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.chain = MessageChain::default();
            self.suppressed = true;
        } else {
            self.chain = MessageChain::plain(text);
            self.suppressed = false;
        }
    }

    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// The chain to deliver, or `None` when nothing should be sent.
    #[must_use]
    pub fn into_outgoing(self) -> Option<MessageChain> {
        if self.suppressed || self.chain.is_empty() {
            None
        } else {
            Some(self.chain)
        }
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;
    async fn handle(&self, ctx: &mut OutContext) -> Result<StepResult>;
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[must_use]
pub fn sanitize_line(s: &str, max: usize) -> String {
    let compact = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&compact, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str) -> OutContext {
        OutContext::new(
            Session::new("matrix", SessionKind::Group, "!room:example.org"),
            "@bob:example.org",
            Arc::new(GroupState::new()),
            MessageChain::plain(text),
        )
    }

    #[test]
    fn empty_plain_result_suppresses() {
        let mut c = ctx("internal error: db down");
        c.set_plain_result("");
        assert!(c.is_suppressed());
        assert!(c.into_outgoing().is_none());
    }

    #[test]
    fn plain_result_replaces_chain() {
        let mut c = ctx("internal error: db down");
        c.set_plain_result("try again later");
        assert!(!c.is_suppressed());
        assert_eq!(c.plain(), "try again later");
        assert_eq!(c.into_outgoing(), Some(MessageChain::plain("try again later")));
    }

    #[test]
    fn sanitize_line_compacts_whitespace() {
        assert_eq!(sanitize_line("a \n b\t\tc", 4), "a b ");
    }
}
