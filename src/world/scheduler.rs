//! Per-frame update loop
//!
//! Once per frame every live entity is posed from its anchors at the frame's
//! timestamp, cursors are posed from their action animations, and the result
//! is handed to a [`RenderSink`]. Nothing here depends on message arrival:
//! a frame with no new messages still advances every interpolation.

use std::time::{Duration, Instant};

use crate::util::vec2::Vec2;
use crate::world::behavior::{behavior_for, Pose};
use crate::world::constants::frame;
use crate::world::cursor::{CursorPose, CursorRegistry};
use crate::world::entity::{EntityId, EntityKind};
use crate::world::registry::EntityRegistry;

/// One entity as it should be drawn this frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pose: Pose,
    pub hovered: bool,
}

/// One remote cursor as it should be drawn this frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCursor {
    pub username: String,
    pub position: Vec2,
    pub pose: CursorPose,
    pub tool: Option<String>,
}

/// Everything the rendering layer needs for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub frame_number: u64,
    pub now_ms: u64,
    /// Bottom to top
    pub entities: Vec<RenderedEntity>,
    /// Sorted by username
    pub cursors: Vec<RenderedCursor>,
}

/// External rendering layer
pub trait RenderSink {
    fn paint(&mut self, frame: &Frame);
}

/// Drives one frame at a time over the registries
pub struct UpdateScheduler {
    frame_interval: Duration,
    frame_number: u64,
    /// Local pointer, for hover highlighting
    pointer: Option<Vec2>,
}

impl UpdateScheduler {
    pub fn new(frame_rate: u32) -> Self {
        let rate = frame_rate.clamp(1, frame::MAX_RATE);
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / rate as f64),
            frame_number: 0,
            pointer: None,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn set_pointer(&mut self, pointer: Option<Vec2>) {
        self.pointer = pointer;
    }

    /// Build one frame and hand it to `sink`. Finished cursor actions are
    /// cleared after the frame is built. Returns the build time.
    pub fn tick<S: RenderSink + ?Sized>(
        &mut self,
        entities: &EntityRegistry,
        cursors: &mut CursorRegistry,
        now_ms: u64,
        sink: &mut S,
    ) -> Duration {
        let started = Instant::now();
        self.frame_number += 1;

        let frame = self.build_frame(entities, cursors, now_ms);
        sink.paint(&frame);
        cursors.expire_actions(now_ms);

        started.elapsed()
    }

    fn build_frame(&self, entities: &EntityRegistry, cursors: &CursorRegistry, now_ms: u64) -> Frame {
        let hovered = self
            .pointer
            .and_then(|p| entities.hit_test(p, now_ms))
            .map(|e| e.id.clone());

        let rendered_entities = entities
            .iter_paint_order()
            .map(|entity| {
                let behavior = behavior_for(entity.kind);
                let mut pose = behavior.pose(entity, now_ms);
                let is_hovered = hovered.as_deref() == Some(entity.id.as_str());
                if is_hovered {
                    if let Some(tint) = behavior.hover_tint() {
                        pose.tint = tint;
                    }
                }
                RenderedEntity {
                    id: entity.id.clone(),
                    kind: entity.kind,
                    pose,
                    hovered: is_hovered,
                }
            })
            .collect();

        let rendered_cursors = cursors
            .iter_sorted()
            .into_iter()
            .map(|cursor| RenderedCursor {
                username: cursor.username.clone(),
                position: cursor.position,
                pose: cursor.pose(now_ms),
                tool: cursor.tool.clone(),
            })
            .collect();

        Frame {
            frame_number: self.frame_number,
            now_ms,
            entities: rendered_entities,
            cursors: rendered_cursors,
        }
    }
}
