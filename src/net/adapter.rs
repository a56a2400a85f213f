//! Boundary between the transport and the local world
//!
//! [`TransportAdapter`] routes decoded inbound envelopes to the entity and
//! cursor registries, passes view-only traffic (user info, chat, store)
//! through to a [`ViewSink`], and turns local input into outbound intents.
//! Intents are fire-and-forget: nothing waits for the server to acknowledge.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::metrics::SyncMetrics;
use crate::net::protocol::{Envelope, InboundMessage, Intent, LocalAction, LocalInput, UserInfo};
use crate::net::session::SessionIdentity;
use crate::util::vec2::Vec2;
use crate::world::cursor::{CursorRegistry, PresenceOutcome};
use crate::world::registry::{EntityRegistry, UpsertOutcome};

/// Source of "now" in milliseconds
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Outbound sink refused a message
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("outbound channel closed")]
    Closed,
}

/// Where outbound envelopes go
pub trait OutboundSink {
    fn send(&mut self, envelope: Envelope) -> Result<(), SendError>;
}

impl OutboundSink for Vec<Envelope> {
    fn send(&mut self, envelope: Envelope) -> Result<(), SendError> {
        self.push(envelope);
        Ok(())
    }
}

impl OutboundSink for tokio::sync::mpsc::UnboundedSender<Envelope> {
    fn send(&mut self, envelope: Envelope) -> Result<(), SendError> {
        tokio::sync::mpsc::UnboundedSender::send(self, envelope).map_err(|_| SendError::Closed)
    }
}

/// View-only updates the core does not interpret
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// The local user's own info changed; money is rounded to cents
    LocalUser {
        username: String,
        money: Option<f64>,
        fields: Map<String, Value>,
    },
    RemoteUser {
        username: String,
        fields: Map<String, Value>,
    },
    UserJoined(String),
    UserLeft(String),
    Chat(Value),
    StoreSummary(Value),
}

/// Where view updates go
pub trait ViewSink {
    fn update(&mut self, update: ViewUpdate);
}

impl ViewSink for Vec<ViewUpdate> {
    fn update(&mut self, update: ViewUpdate) {
        self.push(update);
    }
}

/// The registries a client mirrors
#[derive(Debug)]
pub struct World {
    pub entities: EntityRegistry,
    pub cursors: CursorRegistry,
}

impl World {
    pub fn new(session: SessionIdentity, action_duration_ms: u64) -> Self {
        Self {
            entities: EntityRegistry::new(),
            cursors: CursorRegistry::new(session, action_duration_ms),
        }
    }
}

/// Routes traffic between the transport and the world
pub struct TransportAdapter {
    metrics: Arc<SyncMetrics>,
    /// Last local pointer position
    pointer: Option<Vec2>,
    /// Tool the local user last selected
    selected_tool: Option<String>,
}

impl TransportAdapter {
    /// The local identity is read from the world's cursor registry, so
    /// there is only one copy of it.
    pub fn new(metrics: Arc<SyncMetrics>) -> Self {
        Self {
            metrics,
            pointer: None,
            selected_tool: None,
        }
    }

    pub fn pointer(&self) -> Option<Vec2> {
        self.pointer
    }

    pub fn selected_tool(&self) -> Option<&str> {
        self.selected_tool.as_deref()
    }

    /// Decode and apply one inbound envelope. Bad envelopes are logged and
    /// counted, never propagated.
    pub fn handle<O, V>(
        &mut self,
        envelope: Envelope,
        world: &mut World,
        now_ms: u64,
        outbound: &mut O,
        view: &mut V,
    ) where
        O: OutboundSink + ?Sized,
        V: ViewSink + ?Sized,
    {
        SyncMetrics::incr(&self.metrics.inbound_messages);
        let (channel, event) = (envelope.channel, envelope.event.clone());

        let message = match InboundMessage::decode(envelope) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring {}/{}: {}", channel, event, e);
                SyncMetrics::incr(&self.metrics.undecodable_messages);
                return;
            }
        };

        match message {
            InboundMessage::FullSync { records, rejected } => {
                let stats = world.entities.reconcile(records, now_ms);
                debug!(
                    "Full sync: {} created, {} updated, {} removed, {} rejected",
                    stats.created, stats.updated, stats.removed, rejected
                );
                SyncMetrics::incr(&self.metrics.full_syncs);
                SyncMetrics::add(&self.metrics.rejected_records, rejected);
                self.metrics.record_reconcile(stats);
            }
            InboundMessage::EntityUpdate(record) => {
                SyncMetrics::incr(&self.metrics.deltas);
                let counter = match world.entities.upsert(record, now_ms) {
                    UpsertOutcome::Created => &self.metrics.entities_created,
                    UpsertOutcome::Updated => &self.metrics.entities_updated,
                    UpsertOutcome::Removed => &self.metrics.entities_removed,
                    UpsertOutcome::Ignored => &self.metrics.unknown_removals,
                };
                SyncMetrics::incr(counter);
            }
            InboundMessage::Presence(update) => match world.cursors.upsert(update, now_ms) {
                PresenceOutcome::SelfEcho => SyncMetrics::incr(&self.metrics.self_echoes_dropped),
                PresenceOutcome::Created | PresenceOutcome::Updated | PresenceOutcome::Ignored => {
                    SyncMetrics::incr(&self.metrics.presence_updates)
                }
            },
            InboundMessage::UserLeft(username) => {
                world.cursors.remove_on_disconnect(&username);
                info!("{} left", username);
                view.update(ViewUpdate::UserLeft(username));
            }
            InboundMessage::UserJoined(username) => {
                info!("{} joined", username);
                view.update(ViewUpdate::UserJoined(username));
            }
            InboundMessage::UserInfo(info) => view.update(user_view(world.cursors.session(), info)),
            InboundMessage::Chat(data) => view.update(ViewUpdate::Chat(data)),
            InboundMessage::StoreSummary(data) => view.update(ViewUpdate::StoreSummary(data)),
            InboundMessage::Local(input) => self.handle_local(input, world, now_ms, outbound),
        }
    }

    fn handle_local<O: OutboundSink + ?Sized>(
        &mut self,
        input: LocalInput,
        world: &World,
        now_ms: u64,
        outbound: &mut O,
    ) {
        if let (Some(x), Some(y)) = (input.x, input.y) {
            self.pointer = Some(Vec2::new(x, y));
        }
        let at = self.pointer;

        let intent = match input.action {
            LocalAction::Cursor => at.map(|p| Intent::CursorMove { x: p.x, y: p.y }),
            LocalAction::Tap => at.map(|p| Intent::Tap { x: p.x, y: p.y }),
            LocalAction::Feed => at.map(|p| Intent::Feed { x: p.x, y: p.y }),
            LocalAction::Use => at.map(|p| Intent::Use {
                x: p.x,
                y: p.y,
                tool: input.tool.or_else(|| self.selected_tool.clone()),
            }),
            LocalAction::Pickup => input.tool.map(|item| {
                self.selected_tool = Some(item.clone());
                Intent::Pickup { item }
            }),
            LocalAction::Select => input.tool.map(|tool| {
                self.selected_tool = Some(tool.clone());
                Intent::Select { tool }
            }),
            LocalAction::Click => {
                match at {
                    Some(point) => {
                        self.click_at(point, world, now_ms, outbound);
                    }
                    None => debug!("Click without a pointer position"),
                }
                return;
            }
        };

        match intent {
            Some(intent) => self.send(intent, world.cursors.session(), now_ms, outbound),
            None => debug!("Local {:?} is missing its position or tool", input.action),
        }
    }

    /// Hit-test collectibles at `point` and send a `click` for the top one.
    /// Returns the clicked id.
    pub fn click_at<O: OutboundSink + ?Sized>(
        &mut self,
        point: Vec2,
        world: &World,
        now_ms: u64,
        outbound: &mut O,
    ) -> Option<String> {
        let label = world.entities.hit_test(point, now_ms)?.id.clone();
        self.send(Intent::Click { label: label.clone() }, world.cursors.session(), now_ms, outbound);
        Some(label)
    }

    /// Stamp and send one intent
    pub fn send<O: OutboundSink + ?Sized>(
        &self,
        intent: Intent,
        session: &SessionIdentity,
        now_ms: u64,
        outbound: &mut O,
    ) {
        let envelope = intent.into_envelope(session.username(), now_ms);
        match outbound.send(envelope) {
            Ok(()) => SyncMetrics::incr(&self.metrics.outbound_messages),
            Err(e) => {
                warn!("Dropping outbound intent: {}", e);
                SyncMetrics::incr(&self.metrics.outbound_failures);
            }
        }
    }
}

fn user_view(session: &SessionIdentity, info: UserInfo) -> ViewUpdate {
    if session.is_self(&info.username) {
        ViewUpdate::LocalUser {
            username: info.username,
            money: info.money.map(|m| (m * 100.0).round() / 100.0),
            fields: info.fields,
        }
    } else {
        ViewUpdate::RemoteUser {
            username: info.username,
            fields: info.fields,
        }
    }
}
