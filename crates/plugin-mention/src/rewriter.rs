use plugin_core::{MessageChain, ParseAtConfig, Segment};

use crate::parser::head_regex;

/// Keeps a native mention from gluing onto the text that follows it.
pub const ZERO_WIDTH_SPACE: &str = "\u{200b}";

/// Replaces the fake mention found at `position` by the configured form.
///
/// The fake mention text is always removed. A substitute is only written when
/// `parse_at.enable` is on and an id was resolved, so unresolvable fake
/// mentions simply disappear.
pub fn apply(
    chain: &mut MessageChain,
    position: Option<usize>,
    id: Option<&str>,
    nickname: Option<&str>,
    config: &ParseAtConfig,
) {
    let Some(position) = position else {
        return;
    };
    let Some(Segment::Text { content }) = chain.get(position) else {
        return;
    };

    let rest = head_regex().replacen(content, 1, "").into_owned();
    let rest = (!rest.is_empty()).then_some(rest);
    let id = id.filter(|id| !id.is_empty()).filter(|_| config.enable);

    let inserted: Vec<Segment> = match id {
        None => rest.map(Segment::text).into_iter().collect(),
        Some(id) if config.at_str => {
            let display = nickname.unwrap_or(id);
            vec![Segment::text(format!(
                "@{display} {}",
                rest.unwrap_or_default()
            ))]
        }
        Some(id) => [Segment::mention(id), Segment::text(ZERO_WIDTH_SPACE)]
            .into_iter()
            .chain(rest.map(Segment::text))
            .collect(),
    };

    let segments = chain.segments();
    let rebuilt = segments[..position]
        .iter()
        .cloned()
        .chain(inserted)
        .chain(segments[position + 1..].iter().cloned())
        .collect();
    chain.replace(rebuilt);
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIVE: ParseAtConfig = ParseAtConfig {
        enable: true,
        at_str: false,
    };
    const TEXT: ParseAtConfig = ParseAtConfig {
        enable: true,
        at_str: true,
    };
    const OFF: ParseAtConfig = ParseAtConfig {
        enable: false,
        at_str: false,
    };

    fn image() -> Segment {
        Segment::Image {
            url: "mxc://example.org/cat".to_owned(),
        }
    }

    #[test]
    fn no_position_is_a_no_op() {
        let original = MessageChain::new(vec![Segment::text("[at:42] hi"), image()]);
        let mut chain = original.clone();
        apply(&mut chain, None, Some("42"), None, &NATIVE);
        assert_eq!(chain, original);
    }

    #[test]
    fn text_mode_prefixes_id() {
        let mut chain = MessageChain::plain("hi");
        apply(&mut chain, Some(0), Some("7"), None, &TEXT);
        assert_eq!(chain, MessageChain::plain("@7 hi"));
    }

    #[test]
    fn text_mode_prefers_nickname() {
        let mut chain = MessageChain::plain("@小明  hello there");
        apply(&mut chain, Some(0), Some("7"), Some("小明"), &TEXT);
        assert_eq!(chain, MessageChain::plain("@小明 hello there"));
    }

    #[test]
    fn text_mode_recreates_emptied_segment() {
        let mut chain = MessageChain::new(vec![Segment::text("[at:42]"), image()]);
        apply(&mut chain, Some(0), Some("42"), None, &TEXT);
        assert_eq!(
            chain.segments(),
            &[Segment::text("@42 "), image()]
        );
    }

    #[test]
    fn native_mode_inserts_mention_and_spacer() {
        let mut chain = MessageChain::new(vec![image(), Segment::text("[at:42]   hi"), image()]);
        apply(&mut chain, Some(1), Some("42"), None, &NATIVE);
        assert_eq!(
            chain.segments(),
            &[
                image(),
                Segment::mention("42"),
                Segment::text(ZERO_WIDTH_SPACE),
                Segment::text("hi"),
                image(),
            ]
        );
    }

    #[test]
    fn native_mode_with_emptied_segment() {
        let mut chain = MessageChain::plain("@123456");
        apply(&mut chain, Some(0), Some("123456"), None, &NATIVE);
        assert_eq!(
            chain.segments(),
            &[Segment::mention("123456"), Segment::text(ZERO_WIDTH_SPACE)]
        );
    }

    #[test]
    fn disabled_only_strips() {
        let mut chain = MessageChain::plain("[at:42] hi");
        apply(&mut chain, Some(0), Some("42"), None, &OFF);
        assert_eq!(chain, MessageChain::plain("hi"));
        assert!(!chain.segments().iter().any(Segment::is_mention));
    }

    #[test]
    fn unresolved_mention_is_discarded() {
        let mut chain = MessageChain::new(vec![Segment::text("@stranger"), image()]);
        apply(&mut chain, Some(0), None, Some("stranger"), &NATIVE);
        assert_eq!(chain.segments(), &[image()]);
    }

    #[test]
    fn position_on_non_text_is_ignored() {
        let original = MessageChain::new(vec![image()]);
        let mut chain = original.clone();
        apply(&mut chain, Some(0), Some("42"), None, &NATIVE);
        apply(&mut chain, Some(5), Some("42"), None, &NATIVE);
        assert_eq!(chain, original);
    }
}
