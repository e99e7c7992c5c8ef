use core::fmt::Write as _;
use std::{collections::HashMap, sync::Arc};

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use matrix_sdk::{
    Client, RoomMemberships,
    room::Room,
    ruma::{
        OwnedRoomId, OwnedUserId, RoomId, UserId,
        events::{Mentions, room::message::RoomMessageEventContent},
    },
};
use plugin_core::{
    GroupState, MessageChain, MessageSender, Segment, Session, SessionKind, truncate,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const PLATFORM: &str = "matrix";

/// Delivers pipeline output through the Matrix client.
///
/// Destinations are room ids (`!room:server`) or user ids (`@user:server`),
/// the latter resolved to the existing direct chat with that user.
#[derive(Debug, Clone)]
pub struct MatrixSender {
    client: Client,
}

impl MatrixSender {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    pub const fn client(&self) -> &Client {
        &self.client
    }

    fn resolve_room(&self, target: &str) -> Result<Room> {
        if let Ok(room_id) = RoomId::parse(target) {
            return self
                .client
                .get_room(&room_id)
                .ok_or_else(|| anyhow!("not joined to room {target}"));
        }
        if let Ok(user_id) = UserId::parse(target) {
            return self
                .client
                .get_dm_room(&user_id)
                .ok_or_else(|| anyhow!("no direct chat with {target}"));
        }
        Err(anyhow!(
            "unsupported destination {target} (expect !room_id or @user_id)"
        ))
    }
}

#[async_trait]
impl MessageSender for MatrixSender {
    async fn send_message(&self, destination: &Session, chain: MessageChain) -> Result<()> {
        let room = self.resolve_room(&destination.session_id)?;
        room.send(chain_to_content(&chain))
            .await
            .with_context(|| format!("sending to {}", destination.session_id))?;
        debug!(to = %destination.session_id, segments = chain.len(), "Delivered message");
        Ok(())
    }
}

pub async fn session_for(room: &Room) -> Session {
    let kind = if room.is_direct().await.unwrap_or(false) {
        SessionKind::Private
    } else {
        SessionKind::Group
    };
    Session::new(PLATFORM, kind, room.room_id().as_str())
}

/// Per-room nickname tables, loaded lazily from the member list and dropped
/// whenever membership changes.
#[derive(Debug, Default)]
pub struct GroupDirectory {
    rooms: RwLock<HashMap<OwnedRoomId, Arc<GroupState>>>,
}

impl GroupDirectory {
    pub async fn snapshot(&self, room: &Room) -> Arc<GroupState> {
        if let Some(state) = self.rooms.read().await.get(room.room_id()) {
            return Arc::clone(state);
        }
        let state = Arc::new(load_group_state(room).await);
        self.rooms
            .write()
            .await
            .insert(room.room_id().to_owned(), Arc::clone(&state));
        state
    }

    pub async fn invalidate(&self, room_id: &RoomId) {
        if self.rooms.write().await.remove(room_id).is_some() {
            debug!(room_id = %room_id, "Dropped cached member names");
        }
    }
}

async fn load_group_state(room: &Room) -> GroupState {
    match room.members(RoomMemberships::JOIN).await {
        Ok(members) => {
            let mut state = GroupState::new();
            for member in &members {
                let id = member.user_id().to_string();
                state.insert(member.user_id().localpart(), id.clone());
                if let Some(name) = member.display_name() {
                    state.insert(name, id);
                }
            }
            info!(room_id = %room.room_id(), names = state.len(), "Loaded member names");
            state
        }
        Err(e) => {
            warn!(room_id = %room.room_id(), error = %e, "Failed to load room members; mentions stay unresolved");
            GroupState::new()
        }
    }
}

/// Builds a chain from a text body, turning a reply fallback (`> quoted`
/// lines followed by a blank line) into a quoted-reply segment.
pub fn chain_from_body(body: &str, reply_to: Option<&str>) -> MessageChain {
    let (quoted, main) = split_reply_fallback(body);
    let mut chain = MessageChain::default();
    if reply_to.is_some() || quoted.is_some() {
        chain.push(Segment::QuotedReply {
            id: reply_to.unwrap_or_default().to_owned(),
            excerpt: quoted,
        });
    }
    let main = main.trim();
    if !main.is_empty() {
        chain.push(Segment::text(main));
    }
    chain
}

fn split_reply_fallback(body: &str) -> (Option<String>, String) {
    if let Some(sep_idx) = body.find("\n\n") {
        let (quoted_block, rest) = body.split_at(sep_idx);
        let quoted_lines: Vec<&str> = quoted_block
            .lines()
            .filter(|line| line.starts_with('>'))
            .map(|line| line.trim_start_matches('>').trim_start())
            .collect();
        if !quoted_lines.is_empty() {
            let quoted = quoted_lines.join(" ");
            return (
                Some(quoted.trim().to_owned()),
                rest.trim_start_matches('\n').to_owned(),
            );
        }
    }
    (None, body.to_owned())
}

/// Renders a chain as a Matrix text message; native mentions become pills
/// and are listed in the event's intentional mentions.
pub fn chain_to_content(chain: &MessageChain) -> RoomMessageEventContent {
    let mut body = String::new();
    let mut html = String::new();
    let mut mentioned: Vec<OwnedUserId> = Vec::new();

    let push_text = |body: &mut String, html: &mut String, text: &str| {
        body.push_str(text);
        html.push_str(&escape_html(text));
    };

    for segment in chain.segments() {
        match segment {
            Segment::Text { content } => push_text(&mut body, &mut html, content),
            Segment::Mention { id } => match UserId::parse(id.as_str()) {
                Ok(user_id) => {
                    body.push_str(id);
                    _ = write!(
                        html,
                        "<a href=\"https://matrix.to/#/{id}\">{}</a>",
                        escape_html(id)
                    );
                    mentioned.push(user_id);
                }
                Err(_) => push_text(&mut body, &mut html, &format!("@{id}")),
            },
            Segment::Image { url } => push_text(&mut body, &mut html, url),
            Segment::Sticker { .. } => push_text(&mut body, &mut html, "[sticker]"),
            Segment::QuotedReply { excerpt, .. } => {
                if let Some(q) = excerpt {
                    let line = format!("↪ {}\n", truncate(q, 300));
                    push_text(&mut body, &mut html, &line);
                }
            }
            Segment::Other { kind } => push_text(&mut body, &mut html, &format!("[{kind}]")),
        }
    }

    if mentioned.is_empty() {
        RoomMessageEventContent::text_plain(body)
    } else {
        RoomMessageEventContent::text_html(body, html.replace('\n', "<br>"))
            .add_mentions(Mentions::with_user_ids(mentioned))
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
