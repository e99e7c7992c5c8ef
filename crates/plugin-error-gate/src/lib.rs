//! Keeps internal error text away from end users.
//!
//! Every outgoing reply is scanned for the configured keywords. On a hit the
//! original text is forwarded to the operators and the reply is swapped for
//! `error.custom_msg` (or dropped when that is empty).

use core::fmt::{self, Write as _};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use plugin_core::{
    ErrorConfig, MessageChain, MessageSender, OutContext, PipelineConfig, PipelineError, Session,
    Step, StepName, StepResult, factory::StepFactory, truncate,
};
use tracing::{info, warn};

#[derive(Debug)]
pub struct ErrorGatePlugin;

impl StepFactory for ErrorGatePlugin {
    fn name(&self) -> StepName {
        StepName::Error
    }

    fn build(&self, config: &PipelineConfig, sender: Arc<dyn MessageSender>) -> Arc<dyn Step> {
        Arc::new(ErrorGateStep::new(
            config.error.clone(),
            config.admins_id.clone(),
            sender,
        ))
    }
}

pub struct ErrorGateStep {
    rule: ErrorConfig,
    admins: Vec<String>,
    sender: Arc<dyn MessageSender>,
}

impl fmt::Debug for ErrorGateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorGateStep")
            .field("rule", &self.rule)
            .field("admins", &self.admins)
            .finish_non_exhaustive()
    }
}

impl ErrorGateStep {
    #[must_use]
    pub fn new(rule: ErrorConfig, admins: Vec<String>, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            rule,
            admins,
            sender,
        }
    }

    /// First configured keyword contained in `text`, in list order.
    #[must_use]
    pub fn find_hit_keyword(&self, text: &str) -> Option<&str> {
        self.rule
            .keywords
            .iter()
            .map(String::as_str)
            .filter(|word| !word.is_empty())
            .find(|word| text.contains(word))
    }

    /// Intercepts the reply in `ctx` if it contains an error keyword.
    ///
    /// Returns an operator-facing summary on a hit, `None` otherwise.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoAdminDestination`] when forwarding targets the admin
    /// set but no admin is configured, or the transport error of the first
    /// failed delivery. The reply is left untouched in both cases.
    pub async fn intercept(&self, ctx: &mut OutContext) -> Result<Option<String>> {
        let plain = ctx.plain();
        let Some(hit) = self.find_hit_keyword(&plain) else {
            return Ok(None);
        };
        let mut msg = format!("hit error keyword \"{hit}\"");

        if !self.rule.forward_umo.trim().is_empty() {
            let target = self.forward(&ctx.session, &plain).await?;
            _ = write!(msg, ", forwarded to {target}");
        }

        ctx.set_plain_result(self.rule.custom_msg.clone());
        if ctx.is_suppressed() {
            msg.push_str(", reply suppressed");
        } else {
            _ = write!(msg, ", reply replaced with \"{}\"", self.rule.custom_msg);
        }

        warn!(
            keyword = %hit,
            session = %ctx.session,
            original = %truncate(&plain, 200),
            "Intercepted outgoing error text"
        );
        Ok(Some(msg))
    }

    /// Delivers `plain` to the configured destination(s), one at a time and in
    /// order. Returns a description of where it went.
    async fn forward(&self, origin: &Session, plain: &str) -> Result<String> {
        let target = self.rule.forward_umo.trim();

        if self.rule.forwards_to_admins() {
            if self.admins.is_empty() {
                return Err(PipelineError::NoAdminDestination.into());
            }
            for admin in &self.admins {
                let destination = origin.with_session_id(admin.as_str());
                self.deliver(&destination, plain).await?;
            }
            return Ok(format!("{target} ({} destinations)", self.admins.len()));
        }

        let destination: Session = target.parse().unwrap_or_else(|never| match never {});
        self.deliver(&destination, plain).await?;
        Ok(destination.to_string())
    }

    async fn deliver(&self, destination: &Session, plain: &str) -> Result<()> {
        self.sender
            .send_message(destination, MessageChain::plain(plain))
            .await
            .with_context(|| format!("forwarding intercepted reply to {destination}"))?;
        info!(to = %destination, "Forwarded intercepted reply");
        Ok(())
    }
}

#[async_trait]
impl Step for ErrorGateStep {
    fn name(&self) -> StepName {
        StepName::Error
    }

    async fn handle(&self, ctx: &mut OutContext) -> Result<StepResult> {
        Ok(self
            .intercept(ctx)
            .await?
            .map(StepResult::with_msg)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use plugin_core::{GroupState, Segment, SessionKind};

    use super::*;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_message(&self, destination: &Session, chain: MessageChain) -> Result<()> {
            if destination.session_id.contains("offline") {
                return Err(anyhow!("destination unreachable"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), chain.plain_text()));
            Ok(())
        }
    }

    fn rule(keywords: &[&str], custom_msg: &str, forward_umo: &str) -> ErrorConfig {
        ErrorConfig {
            keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
            custom_msg: custom_msg.to_owned(),
            forward_umo: forward_umo.to_owned(),
        }
    }

    fn gate(rule: ErrorConfig, admins: &[&str]) -> (ErrorGateStep, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let step = ErrorGateStep::new(
            rule,
            admins.iter().map(|a| (*a).to_owned()).collect(),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
        );
        (step, sender)
    }

    fn ctx(text: &str) -> OutContext {
        OutContext::new(
            Session::new("matrix", SessionKind::Group, "!room:example.org"),
            "@bob:example.org",
            Arc::new(GroupState::new()),
            MessageChain::new(vec![Segment::mention("@bob:example.org"), Segment::text(text)]),
        )
    }

    #[tokio::test]
    async fn no_hit_leaves_reply_alone() {
        let (step, sender) = gate(rule(&["Traceback"], "oops", "admin-set"), &["@root:example.org"]);
        let mut c = ctx("all fine");
        let before = c.chain.clone();
        assert_eq!(step.intercept(&mut c).await.unwrap(), None);
        assert_eq!(c.chain, before);
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn keyword_list_order_wins_over_text_position() {
        let text = "request failed: timeout";
        let (step, _) = gate(rule(&["failed", "timeout"], "", ""), &[]);
        assert_eq!(step.find_hit_keyword(text), Some("failed"));
        let (step, _) = gate(rule(&["timeout", "failed"], "", ""), &[]);
        assert_eq!(step.find_hit_keyword(text), Some("timeout"));
        let (step, _) = gate(rule(&["", "nope"], "", ""), &[]);
        assert_eq!(step.find_hit_keyword(text), None);
    }

    #[tokio::test]
    async fn broadcasts_to_every_admin_in_order() {
        let (step, sender) = gate(
            rule(&["Traceback"], "something went wrong", "admin-set"),
            &["@alice:example.org", "@root:example.org"],
        );
        let mut c = ctx("Traceback (most recent call last)");
        let msg = step.intercept(&mut c).await.unwrap().unwrap();

        assert_eq!(
            sender.sent(),
            vec![
                (
                    "matrix:GroupMessage:@alice:example.org".to_owned(),
                    "Traceback (most recent call last)".to_owned()
                ),
                (
                    "matrix:GroupMessage:@root:example.org".to_owned(),
                    "Traceback (most recent call last)".to_owned()
                ),
            ]
        );
        assert_eq!(c.chain, MessageChain::plain("something went wrong"));
        assert_eq!(
            msg,
            "hit error keyword \"Traceback\", forwarded to admin-set (2 destinations), reply replaced with \"something went wrong\""
        );
    }

    #[tokio::test]
    async fn admin_set_without_admins_is_fatal() {
        let (step, sender) = gate(rule(&["Traceback"], "oops", "admin-set"), &[]);
        let mut c = ctx("Traceback");
        let err = step.intercept(&mut c).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoAdminDestination)
        ));
        assert!(sender.sent().is_empty());
        assert!(!c.is_suppressed());
    }

    #[tokio::test]
    async fn literal_destination_gets_one_copy() {
        let (step, sender) = gate(
            rule(&["panic"], "oops", "matrix:GroupMessage:!ops:example.org"),
            &["@ignored:example.org"],
        );
        let mut c = ctx("thread panicked");
        step.intercept(&mut c).await.unwrap();
        assert_eq!(
            sender.sent(),
            vec![(
                "matrix:GroupMessage:!ops:example.org".to_owned(),
                "thread panicked".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn empty_custom_message_suppresses_reply() {
        let (step, sender) = gate(rule(&["error"], "", ""), &[]);
        let mut c = ctx("error: connection refused");
        let result = step.handle(&mut c).await.unwrap();
        assert!(c.is_suppressed());
        assert!(sender.sent().is_empty());
        assert_eq!(
            result.msg.as_deref(),
            Some("hit error keyword \"error\", reply suppressed")
        );
        assert_eq!(c.into_outgoing(), None);
    }

    #[tokio::test]
    async fn delivery_failure_stops_forwarding() {
        let (step, sender) = gate(
            rule(&["Traceback"], "oops", "admin"),
            &["@offline:example.org", "@root:example.org"],
        );
        let mut c = ctx("Traceback");
        let err = step.intercept(&mut c).await.unwrap_err();
        assert!(err.to_string().contains("@offline:example.org"));
        assert!(sender.sent().is_empty());
        assert_eq!(c.plain(), "Traceback");
    }
}
