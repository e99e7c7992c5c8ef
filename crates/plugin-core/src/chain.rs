use serde::{Deserialize, Serialize};

/// One typed piece of a message, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { content: String },
    Mention { id: String },
    Image { url: String },
    Sticker { id: String },
    QuotedReply { id: String, excerpt: Option<String> },
    /// Anything the host can carry but this pipeline does not understand
    /// (files, voice, forwarded bundles...).
    Other { kind: String },
}

impl Segment {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn mention(id: impl Into<String>) -> Self {
        Self::Mention { id: id.into() }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            Self::Mention { .. }
            | Self::Image { .. }
            | Self::Sticker { .. }
            | Self::QuotedReply { .. }
            | Self::Other { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_mention(&self) -> bool {
        matches!(self, Self::Mention { .. })
    }

    /// Whether the segment kind is one the mention policy knows how to reason
    /// about.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        match self {
            Self::Text { .. }
            | Self::Mention { .. }
            | Self::Image { .. }
            | Self::Sticker { .. }
            | Self::QuotedReply { .. } => true,
            Self::Other { .. } => false,
        }
    }
}

/// Ordered segments composing one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain {
    segments: Vec<Segment>,
}

impl MessageChain {
    #[must_use]
    pub const fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// A chain made of a single text segment.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(vec![Segment::text(text)])
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    #[must_use]
    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Swap in a freshly computed segment list.
    pub fn replace(&mut self, segments: Vec<Segment>) {
        self.segments = segments;
    }

    #[must_use]
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Concatenated text content, the form outgoing replies are scanned in.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(Segment::as_text)
            .collect::<String>()
    }
}

impl From<Vec<Segment>> for MessageChain {
    fn from(segments: Vec<Segment>) -> Self {
        Self::new(segments)
    }
}

impl FromIterator<Segment> for MessageChain {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_skips_non_text_segments() {
        let chain = MessageChain::new(vec![
            Segment::mention("42"),
            Segment::text("hello "),
            Segment::Image {
                url: "mxc://example.org/abc".to_owned(),
            },
            Segment::text("world"),
        ]);
        assert_eq!(chain.plain_text(), "hello world");
    }

    #[test]
    fn other_segments_are_unsupported() {
        assert!(Segment::text("x").is_supported());
        assert!(
            Segment::QuotedReply {
                id: "$evt".to_owned(),
                excerpt: None
            }
            .is_supported()
        );
        assert!(
            !Segment::Other {
                kind: "file".to_owned()
            }
            .is_supported()
        );
    }

    #[test]
    fn segments_deserialize_from_tagged_yaml() {
        let yaml = "- type: text\n  content: hi\n- type: mention\n  id: '7'\n";
        let chain: MessageChain = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            chain.segments(),
            &[Segment::text("hi"), Segment::mention("7")]
        );
    }
}
