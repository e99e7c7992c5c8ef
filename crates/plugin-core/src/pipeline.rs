use core::fmt;
use std::{collections::HashSet, sync::Arc};

use anyhow::{Context as _, Result};
use tracing::{debug, info};

use crate::{MessageSender, OutContext, PipelineConfig, Step, factory::StepFactory};

/// Ordered outbound steps applied to every outgoing message.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn Step>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| s.name()))
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Builds one step per factory, in the given order. A factory whose step
    /// name was already produced is skipped.
    #[must_use]
    pub fn from_factories(
        factories: &[&dyn StepFactory],
        config: &PipelineConfig,
        sender: &Arc<dyn MessageSender>,
    ) -> Self {
        let mut seen = HashSet::new();
        let steps = factories
            .iter()
            .filter(|f| seen.insert(f.name()))
            .map(|f| f.build(config, Arc::clone(sender)))
            .collect();
        Self { steps }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step until one fails or the reply gets suppressed.
    pub async fn run(&self, ctx: &mut OutContext) -> Result<()> {
        for step in &self.steps {
            let name = step.name();
            let result = step
                .handle(ctx)
                .await
                .with_context(|| format!("step {name} failed"))?;
            if let Some(msg) = result.msg {
                info!(step = %name, session = %ctx.session, "{msg}");
            }
            if ctx.is_suppressed() {
                debug!(step = %name, "Reply suppressed; skipping remaining steps");
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        GroupState, MessageChain, PipelineError, Session, SessionKind, StepName, StepResult,
    };

    struct Silence;

    #[async_trait]
    impl Step for Silence {
        fn name(&self) -> StepName {
            StepName::Error
        }

        async fn handle(&self, ctx: &mut OutContext) -> Result<StepResult> {
            ctx.set_plain_result("");
            Ok(StepResult::with_msg("silenced"))
        }
    }

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl Step for Count {
        fn name(&self) -> StepName {
            StepName::Mention
        }

        async fn handle(&self, _ctx: &mut OutContext) -> Result<StepResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(StepResult::default())
        }
    }

    struct Broken;

    #[async_trait]
    impl Step for Broken {
        fn name(&self) -> StepName {
            StepName::Error
        }

        async fn handle(&self, _ctx: &mut OutContext) -> Result<StepResult> {
            Err(PipelineError::NoAdminDestination.into())
        }
    }

    fn ctx() -> OutContext {
        OutContext::new(
            Session::new("matrix", SessionKind::Group, "!room:example.org"),
            "@bob:example.org",
            Arc::new(GroupState::new()),
            MessageChain::plain("hello"),
        )
    }

    #[tokio::test]
    async fn stops_after_suppression() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(vec![
            Arc::new(Count(Arc::clone(&counter))),
            Arc::new(Silence),
            Arc::new(Count(Arc::clone(&counter))),
        ]);
        let mut c = ctx();
        pipeline.run(&mut c).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(c.is_suppressed());
    }

    #[tokio::test]
    async fn step_errors_keep_their_type() {
        let pipeline = Pipeline::new(vec![Arc::new(Broken)]);
        let err = pipeline.run(&mut ctx()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoAdminDestination)
        ));
    }
}
