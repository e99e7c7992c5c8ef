use core::{convert::Infallible, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    #[default]
    Group,
    Private,
}

impl SessionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Group => "GroupMessage",
            Self::Private => "FriendMessage",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "GroupMessage" => Some(Self::Group),
            "FriendMessage" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Where a message comes from or goes to.
///
/// The string form is `platform:Kind:session_id` (e.g.
/// `matrix:GroupMessage:!room:example.org`); session ids may themselves
/// contain colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub platform: String,
    pub kind: SessionKind,
    pub session_id: String,
}

impl Session {
    pub fn new(platform: impl Into<String>, kind: SessionKind, session_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            kind,
            session_id: session_id.into(),
        }
    }

    /// Same platform and kind, different target.
    #[must_use]
    pub fn with_session_id(&self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.platform.is_empty() {
            f.write_str(&self.session_id)
        } else {
            write!(
                f,
                "{}:{}:{}",
                self.platform,
                self.kind.as_str(),
                self.session_id
            )
        }
    }
}

impl FromStr for Session {
    type Err = Infallible;

    /// Anything not shaped like `platform:Kind:id` is taken as a bare id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.splitn(3, ':');
        if let (Some(platform), Some(kind), Some(id)) = (parts.next(), parts.next(), parts.next())
            && !platform.is_empty()
            && !id.is_empty()
            && let Some(kind) = SessionKind::parse(kind)
        {
            return Ok(Self::new(platform, kind, id));
        }
        Ok(Self::new("", SessionKind::default(), s))
    }
}
