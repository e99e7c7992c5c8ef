//! Mention shaping for outgoing messages.
//!
//! Upstream sources that cannot produce real mentions write them as text
//! (`[at:123]`, `@nickname`, `@123456`). The [`MentionStep`] recognizes such a
//! fake mention at the head of the message, resolves it against the group's
//! nickname table, rewrites it as a native mention (or `@name` text), and
//! finally lets the probabilistic policy add or remove mentions to vary tone.

pub mod parser;
pub mod policy;
pub mod rewriter;

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use plugin_core::{
    MessageSender, OutContext, ParseAtConfig, PipelineConfig, Step, StepName, StepResult,
    factory::StepFactory,
};
use rand::{SeedableRng as _, rngs::StdRng};
use tracing::debug;

pub use parser::{ParseResult, parse};
pub use policy::PolicyOutcome;

#[derive(Debug)]
pub struct MentionPlugin;

impl StepFactory for MentionPlugin {
    fn name(&self) -> StepName {
        StepName::Mention
    }

    fn build(&self, config: &PipelineConfig, _sender: Arc<dyn MessageSender>) -> Arc<dyn Step> {
        Arc::new(MentionStep::new(config))
    }
}

#[derive(Debug)]
pub struct MentionStep {
    parse_at: ParseAtConfig,
    at_prob: f64,
    rng: Mutex<StdRng>,
}

impl MentionStep {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Uses the given generator for the probabilistic pass.
    #[must_use]
    pub fn with_rng(config: &PipelineConfig, rng: StdRng) -> Self {
        Self {
            parse_at: config.parse_at.clone(),
            at_prob: config.at_prob,
            rng: Mutex::new(rng),
        }
    }

    /// Runs parse, rewrite and policy over the context's chain.
    pub fn shape(&self, ctx: &mut OutContext) -> (ParseResult, PolicyOutcome) {
        let parsed = parse(&ctx.chain, &ctx.group);
        rewriter::apply(
            &mut ctx.chain,
            parsed.position,
            parsed.id.as_deref(),
            parsed.nickname.as_deref(),
            &self.parse_at,
        );

        // at_prob = 0 turns the policy off entirely.
        let outcome = if self.at_prob > 0.0 {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            policy::apply(&mut ctx.chain, &ctx.sender_id, self.at_prob, &mut *rng)
        } else {
            PolicyOutcome::Skipped
        };
        (parsed, outcome)
    }
}

#[async_trait]
impl Step for MentionStep {
    fn name(&self) -> StepName {
        StepName::Mention
    }

    async fn handle(&self, ctx: &mut OutContext) -> Result<StepResult> {
        let (parsed, outcome) = self.shape(ctx);
        debug!(?parsed, ?outcome, segments = ctx.chain.len(), "Shaped mentions");

        let mut notes = Vec::new();
        if let Some(written) = parsed.nickname.as_deref().or(parsed.id.as_deref()) {
            match parsed.id.as_deref() {
                Some(id) if self.parse_at.enable => {
                    notes.push(format!("fake mention {written} rewritten for {id}"));
                }
                Some(_) => notes.push(format!("fake mention {written} stripped")),
                None => notes.push(format!("unresolved fake mention {written} dropped")),
            }
        }
        match outcome {
            PolicyOutcome::Injected => notes.push(format!("mentioned sender {}", ctx.sender_id)),
            PolicyOutcome::Stripped => notes.push("removed all mentions".to_owned()),
            PolicyOutcome::Kept | PolicyOutcome::Skipped => {}
        }

        if notes.is_empty() {
            Ok(StepResult::default())
        } else {
            Ok(StepResult::with_msg(notes.join(", ")))
        }
    }
}
