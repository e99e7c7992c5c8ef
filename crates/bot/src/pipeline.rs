use std::sync::Arc;

use plugin_core::{MessageSender, Pipeline, PipelineConfig, factory::StepFactory};
use plugin_error_gate::ErrorGatePlugin;
use plugin_mention::MentionPlugin;
use tracing::info;

/// Mention shaping runs first so the error gate scans the final text.
pub fn build_pipeline(config: &PipelineConfig, sender: &Arc<dyn MessageSender>) -> Pipeline {
    #[rustfmt::skip]
    let factories: [&dyn StepFactory; 2] = [
        &MentionPlugin,
        &ErrorGatePlugin,
    ];

    let pipeline = Pipeline::from_factories(&factories, config, sender);
    info!(
        steps = ?pipeline,
        parse_at = config.parse_at.enable,
        at_str = config.parse_at.at_str,
        at_prob = config.at_prob,
        keywords = config.error.keywords.len(),
        forward = %config.error.forward_umo,
        admins = config.admins_id.len(),
        "Built outbound pipeline"
    );
    pipeline
}
