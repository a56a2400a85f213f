//! Remote users' cursors (presence)
//!
//! Cursors are keyed by username and snap straight to the last reported
//! coordinate; there is nothing to interpolate. Named events (tap, pickup,
//! use, select) start a one-shot action animation that reverts to idle when
//! it finishes. A new action restarts any animation already playing.
//!
//! The local session's own cursor is never stored, whatever the transport
//! echoes back.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::net::session::SessionIdentity;
use crate::util::vec2::Vec2;
use crate::world::lenient;

/// One-shot action a remote cursor can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CursorAction {
    Tap,
    Pickup,
    Use,
    Select,
}

impl CursorAction {
    /// Map a presence event name to an action; movement events map to `None`
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "tap" => Some(CursorAction::Tap),
            "pickup" | "pick_up_item" => Some(CursorAction::Pickup),
            "use" => Some(CursorAction::Use),
            "select" => Some(CursorAction::Select),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CursorAction::Tap => "tap",
            CursorAction::Pickup => "pickup",
            CursorAction::Use => "use",
            CursorAction::Select => "select",
        }
    }
}

/// An action animation in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionAnimation {
    pub action: CursorAction,
    pub started_ms: u64,
    pub duration_ms: u64,
}

impl ActionAnimation {
    /// Fraction played, clamped to 0..=1
    pub fn progress(&self, now_ms: u64) -> f32 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(self.started_ms);
        (elapsed as f32 / self.duration_ms as f32).min(1.0)
    }

    pub fn is_finished(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_ms) >= self.duration_ms
    }
}

/// What a cursor should look like this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorPose {
    Idle,
    Acting { action: CursorAction, progress: f32 },
}

/// Presence report for one remote user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceUpdate {
    pub username: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: Option<f32>,
    /// Event name carried in the payload (e.g. "mousemove", "tap")
    #[serde(default, deserialize_with = "lenient::text")]
    pub event: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tool: Option<String>,
}

impl PresenceUpdate {
    pub fn moved(username: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            username: username.into(),
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    fn position(&self) -> Option<Vec2> {
        Some(Vec2::new(self.x?, self.y?))
    }

    fn action(&self) -> Option<CursorAction> {
        self.event.as_deref().and_then(CursorAction::from_event)
    }
}

/// One remote user's cursor
#[derive(Debug, Clone, PartialEq)]
pub struct CursorState {
    pub username: String,
    pub position: Vec2,
    pub action: Option<ActionAnimation>,
    /// Tool the remote user last selected
    pub tool: Option<String>,
    pub last_seen_ms: u64,
}

impl CursorState {
    pub fn pose(&self, now_ms: u64) -> CursorPose {
        match self.action {
            Some(anim) if !anim.is_finished(now_ms) => CursorPose::Acting {
                action: anim.action,
                progress: anim.progress(now_ms),
            },
            _ => CursorPose::Idle,
        }
    }
}

/// Result of applying a presence update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// The update described the local session and was dropped
    SelfEcho,
    Created,
    Updated,
    /// Unknown user without coordinates; nothing to place
    Ignored,
}

/// Remote cursors, excluding the local session's own
#[derive(Debug)]
pub struct CursorRegistry {
    session: SessionIdentity,
    cursors: HashMap<String, CursorState>,
    action_duration_ms: u64,
}

impl CursorRegistry {
    pub fn new(session: SessionIdentity, action_duration_ms: u64) -> Self {
        Self {
            session,
            cursors: HashMap::new(),
            action_duration_ms,
        }
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.cursors.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<&CursorState> {
        self.cursors.get(username)
    }

    /// Cursors in username order
    pub fn iter_sorted(&self) -> Vec<&CursorState> {
        let mut cursors: Vec<&CursorState> = self.cursors.values().collect();
        cursors.sort_unstable_by(|a, b| a.username.cmp(&b.username));
        cursors
    }

    pub fn upsert(&mut self, update: PresenceUpdate, now_ms: u64) -> PresenceOutcome {
        if self.session.is_self(&update.username) {
            debug!("Dropping echoed presence for local user {}", update.username);
            return PresenceOutcome::SelfEcho;
        }

        let position = update.position();
        let action = update.action().map(|action| ActionAnimation {
            action,
            started_ms: now_ms,
            duration_ms: self.action_duration_ms,
        });

        if let Some(cursor) = self.cursors.get_mut(update.username.as_str()) {
            if let Some(position) = position {
                cursor.position = position;
            }
            if let Some(anim) = action {
                // Restart, even if the same action is mid-flight
                cursor.action = Some(anim);
                if anim.action == CursorAction::Select {
                    cursor.tool = update.tool;
                }
            }
            cursor.last_seen_ms = now_ms;
            return PresenceOutcome::Updated;
        }

        let Some(position) = position else {
            debug!("Presence for unknown user {} has no position", update.username);
            return PresenceOutcome::Ignored;
        };

        let tool = match action {
            Some(anim) if anim.action == CursorAction::Select => update.tool,
            _ => None,
        };
        debug!("Adding cursor for {}", update.username);
        self.cursors.insert(
            update.username.clone(),
            CursorState {
                username: update.username,
                position,
                action,
                tool,
                last_seen_ms: now_ms,
            },
        );
        PresenceOutcome::Created
    }

    /// Remove a cursor when its user leaves. Unknown users are ignored.
    pub fn remove_on_disconnect(&mut self, username: &str) -> bool {
        if self.cursors.remove(username).is_some() {
            debug!("Removed cursor for {}", username);
            true
        } else {
            debug!("Cursor {} not found for removal", username);
            false
        }
    }

    /// Clear finished action animations, returning whose ended
    pub fn expire_actions(&mut self, now_ms: u64) -> SmallVec<[String; 4]> {
        let finished: SmallVec<[String; 4]> = self
            .cursors
            .values()
            .filter(|c| c.action.is_some_and(|a| a.is_finished(now_ms)))
            .map(|c| c.username.clone())
            .collect();

        for username in &finished {
            if let Some(cursor) = self.cursors.get_mut(username.as_str()) {
                cursor.action = None;
            }
        }

        finished
    }
}
