use std::{borrow::ToOwned, collections::HashMap};

use anyhow::Result;
use matrix_sdk::{
    Client,
    room::Room,
    ruma::{
        OwnedRoomId, OwnedUserId, RoomAliasId, RoomId,
        events::room::message::{MessageType, OriginalSyncRoomMessageEvent, Relation},
    },
};
use plugin_core::{
    MessageChain, MessageSender, OutContext, Pipeline, Segment, Session, SessionKind,
    sanitize_line,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::matrix::{GroupDirectory, MatrixSender, PLATFORM, chain_from_body, session_for};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomCluster {
    #[serde(default)]
    pub rooms: Vec<String>,
}

/// Room → peers to copy its messages into.
#[derive(Debug, Clone, Default)]
pub struct RelayPlan {
    map: HashMap<OwnedRoomId, Vec<OwnedRoomId>>,
}

impl RelayPlan {
    pub fn targets(&self, room_id: &RoomId) -> Option<&[OwnedRoomId]> {
        self.map.get(room_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Every room of a cluster relays to every other room of it; a room in
    /// several clusters relays to the union of their peers.
    fn from_clusters(clusters: Vec<Vec<OwnedRoomId>>) -> Self {
        let mut map: HashMap<OwnedRoomId, Vec<OwnedRoomId>> = HashMap::new();
        for resolved in clusters {
            for r in &resolved {
                let entry = map.entry(r.clone()).or_default();
                for peer in resolved.iter().filter(|x| *x != r) {
                    if !entry.contains(peer) {
                        entry.push(peer.clone());
                    }
                }
            }
        }
        Self { map }
    }
}

pub async fn resolve_relay_plan(client: &Client, clusters: &[RoomCluster]) -> RelayPlan {
    let mut resolved_clusters = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let mut resolved: Vec<OwnedRoomId> = Vec::new();
        for room_ref in &cluster.rooms {
            if let Ok(id) = RoomId::parse(room_ref) {
                resolved.push(id);
                continue;
            }
            if let Ok(alias) = RoomAliasId::parse(room_ref) {
                match client.resolve_room_alias(&alias).await {
                    Ok(resp) => resolved.push(resp.room_id),
                    Err(e) => {
                        warn!(alias = %room_ref, error = %e, "Failed to resolve room alias; skipping");
                    }
                }
            } else {
                warn!(room = %room_ref, "Invalid room reference (expect !room_id or #alias); skipping");
            }
        }
        resolved_clusters.push(resolved);
    }

    let plan = RelayPlan::from_clusters(resolved_clusters);
    info!(clusters = clusters.len(), rooms = plan.len(), "Loaded relay mapping");
    for (from, peers) in &plan.map {
        let peer_list = peers
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        info!(from = %from, peers = %peer_list, "Relay mapping entry");
    }
    plan
}

/// Copies messages between clustered rooms, shaping text through the
/// outbound pipeline first.
#[derive(Debug)]
pub struct Relay {
    plan: RelayPlan,
    pipeline: Pipeline,
    groups: GroupDirectory,
    sender: MatrixSender,
}

impl Relay {
    pub fn new(plan: RelayPlan, pipeline: Pipeline, sender: MatrixSender) -> Self {
        Self {
            plan,
            pipeline,
            groups: GroupDirectory::default(),
            sender,
        }
    }

    pub const fn groups(&self) -> &GroupDirectory {
        &self.groups
    }

    pub async fn on_room_message(
        &self,
        room: &Room,
        event: &OriginalSyncRoomMessageEvent,
    ) -> Result<()> {
        let source_id = room.room_id();
        let Some(targets) = self.plan.targets(source_id) else {
            return Ok(());
        };

        let display_name = resolve_display_name(room, &event.sender).await;
        let (body, prefix) = match &event.content.msgtype {
            MessageType::Text(t) => (t.body.as_str(), ""),
            MessageType::Notice(n) => (n.body.as_str(), ""),
            MessageType::Emote(e) => (e.body.as_str(), "* "),
            MessageType::Audio(_)
            | MessageType::File(_)
            | MessageType::Image(_)
            | MessageType::Location(_)
            | MessageType::ServerNotice(_)
            | MessageType::Video(_)
            | MessageType::VerificationRequest(_)
            | _ => {
                self.forward_raw(source_id, targets, event).await;
                return Ok(());
            }
        };

        let reply_to = match &event.content.relates_to {
            Some(Relation::Reply { in_reply_to }) => Some(in_reply_to.event_id.to_string()),
            _ => None,
        };
        let chain = chain_from_body(body, reply_to.as_deref());
        let mut ctx = OutContext::new(
            session_for(room).await,
            event.sender.as_str(),
            self.groups.snapshot(room).await,
            chain,
        );
        self.pipeline.run(&mut ctx).await?;

        let Some(shaped) = ctx.into_outgoing() else {
            info!(from = %source_id, sender = %event.sender, "Reply suppressed; nothing relayed");
            return Ok(());
        };
        let mut segments = vec![Segment::text(format!("{}: {prefix}", to_bold(&display_name)))];
        segments.extend(shaped.into_segments());
        let outgoing = MessageChain::new(segments);

        debug!(body = %sanitize_line(&outgoing.plain_text(), 200), "Relaying shaped message");
        for target_id in targets {
            if target_id.as_str() == source_id.as_str() {
                continue;
            }
            let destination = Session::new(PLATFORM, SessionKind::Group, target_id.as_str());
            match self.sender.send_message(&destination, outgoing.clone()).await {
                Ok(()) => {
                    info!(from = %source_id, to = %target_id, sender = %event.sender, "Relayed message");
                }
                Err(e) => {
                    warn!(error = %e, from = %source_id, to = %target_id, "Failed to relay message");
                }
            }
        }
        Ok(())
    }

    /// Media and other non-text events are copied unchanged.
    async fn forward_raw(
        &self,
        source_id: &RoomId,
        targets: &[OwnedRoomId],
        event: &OriginalSyncRoomMessageEvent,
    ) {
        for target_id in targets {
            if target_id.as_str() == source_id.as_str() {
                continue;
            }
            let Some(room) = self.sender.client().get_room(target_id) else {
                warn!(from = %source_id, to = %target_id, "No handle for target room; skipping relay");
                continue;
            };
            if let Err(e) = room.send(event.content.clone()).await {
                warn!(error = %e, from = %source_id, to = %target_id, "Failed to relay media");
            }
        }
    }
}

async fn resolve_display_name(room: &Room, sender: &OwnedUserId) -> String {
    match room.get_member(sender).await {
        Ok(Some(member)) => member
            .display_name()
            .map_or_else(|| sender.localpart().to_owned(), ToOwned::to_owned),
        _ => sender.localpart().to_owned(),
    }
}

fn to_bold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'A'..='Z' => char::from_u32('𝐀' as u32 + (c as u32 - 'A' as u32)).unwrap_or(c),
            'a'..='z' => char::from_u32('𝐚' as u32 + (c as u32 - 'a' as u32)).unwrap_or(c),
            '0'..='9' => char::from_u32('𝟎' as u32 + (c as u32 - '0' as u32)).unwrap_or(c),
            _ => c,
        })
        .collect()
}
