use std::sync::OnceLock;

use plugin_core::{GroupState, MessageChain};
use regex::Regex;

static HEAD_REGEX: OnceLock<Regex> = OnceLock::new();

/// Leading pseudo-mention, in priority order:
/// `[at:123]`, `[at:nick]`, `@123456`, `@nick`. Trailing whitespace belongs
/// to the match so stripping it leaves the message body.
pub(crate) fn head_regex() -> &'static Regex {
    HEAD_REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^\s*(?:",
            r"\[at[:：]\s*(\d+)\]",
            r"|\[at[:：]\s*([^\]]+)\]",
            r"|@(\d{5,12})",
            r"|@([\x{4e00}-\x{9fa5}\w-]{2,20})",
            r")\s*",
        ))
        .expect("head mention regex is valid")
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    /// Index of the text segment holding the fake mention.
    pub position: Option<usize>,
    pub id: Option<String>,
    pub nickname: Option<String>,
}

impl ParseResult {
    #[must_use]
    pub const fn is_found(&self) -> bool {
        self.position.is_some()
    }
}

/// Looks for a fake mention at the head of the first non-empty text segment.
///
/// Only that one segment is tried: if it does not start with a pattern, the
/// chain has no fake mention.
#[must_use]
pub fn parse(chain: &MessageChain, group: &GroupState) -> ParseResult {
    let Some((position, text)) = chain
        .segments()
        .iter()
        .enumerate()
        .find_map(|(i, seg)| seg.as_text().filter(|t| !t.is_empty()).map(|t| (i, t)))
    else {
        return ParseResult::default();
    };

    let Some(caps) = head_regex().captures(text) else {
        return ParseResult::default();
    };

    let captured = |a: usize, b: usize| {
        caps.get(a)
            .or_else(|| caps.get(b))
            .map(|m| m.as_str().to_owned())
    };
    let nickname = captured(2, 4);
    let id = captured(1, 3).or_else(|| {
        nickname
            .as_deref()
            .and_then(|name| group.lookup(name))
            .map(ToOwned::to_owned)
    });

    ParseResult {
        position: Some(position),
        id,
        nickname,
    }
}
