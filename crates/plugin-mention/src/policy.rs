use std::sync::OnceLock;

use plugin_core::{MessageChain, Segment};
use rand::Rng;
use regex::Regex;

static LEADING_AT: OnceLock<Regex> = OnceLock::new();

fn leading_at_regex() -> &'static Regex {
    LEADING_AT.get_or_init(|| {
        Regex::new(r"^\s*@[\x{4e00}-\x{9fa5}\w-]+\s*").expect("leading mention regex is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The chain carries something the policy does not reason about.
    Skipped,
    /// The draw agreed with the chain; nothing changed.
    Kept,
    Injected,
    Stripped,
}

/// Nudges the chain towards "mentions the sender" with the given probability.
///
/// A hit on a mention-free chain that starts with text prepends a mention of
/// `sender_id`; a miss on a chain that mentions someone removes every
/// mention. All other combinations leave the chain untouched.
pub fn apply<R: Rng + ?Sized>(
    chain: &mut MessageChain,
    sender_id: &str,
    probability: f64,
    rng: &mut R,
) -> PolicyOutcome {
    if !chain.segments().iter().all(Segment::is_supported) {
        return PolicyOutcome::Skipped;
    }

    let has_mention = chain.segments().iter().any(|seg| {
        seg.is_mention() || seg.as_text().is_some_and(|t| t.trim_start().starts_with('@'))
    });
    let hit = rng.gen_range(0.0..1.0) < probability;

    if hit && !has_mention {
        if chain.first().and_then(Segment::as_text).is_none() {
            return PolicyOutcome::Kept;
        }
        let rebuilt = core::iter::once(Segment::mention(sender_id))
            .chain(chain.segments().iter().cloned())
            .collect();
        chain.replace(rebuilt);
        return PolicyOutcome::Injected;
    }

    if !hit && has_mention {
        let rebuilt = chain
            .segments()
            .iter()
            .filter_map(|seg| match seg {
                Segment::Mention { .. } => None,
                Segment::Text { content } => {
                    let rest = leading_at_regex().replacen(content, 1, "");
                    (!rest.is_empty()).then(|| Segment::text(rest))
                }
                Segment::Image { .. }
                | Segment::Sticker { .. }
                | Segment::QuotedReply { .. }
                | Segment::Other { .. } => Some(seg.clone()),
            })
            .collect();
        chain.replace(rebuilt);
        return PolicyOutcome::Stripped;
    }

    PolicyOutcome::Kept
}
