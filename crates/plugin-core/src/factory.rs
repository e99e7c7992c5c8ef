use std::sync::Arc;

use crate::{MessageSender, PipelineConfig, Step, StepName};

/// Builds one pipeline step from the shared configuration.
pub trait StepFactory {
    /// The step this factory produces; used to order and de-duplicate steps.
    fn name(&self) -> StepName;

    /// Builds the step instance.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated pipeline configuration.
    /// * `sender` - Transport for steps that deliver messages on their own
    ///   (e.g. forwarding an intercepted reply to operators).
    #[must_use]
    fn build(&self, config: &PipelineConfig, sender: Arc<dyn MessageSender>) -> Arc<dyn Step>;
}
