//! Per-kind behaviour table
//!
//! Only three things vary between kinds: where a new entity lands in paint
//! order, how its pose is derived each frame, and whether the local user can
//! click it. Each kind maps to a static [`KindBehavior`] row.

use crate::util::vec2::Vec2;
use crate::world::constants::{fish, tint};
use crate::world::entity::{EntityKind, EntityState};
use crate::world::interpolation::{self, Facing};

/// Where newly created entities of a kind are placed in paint order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintLayer {
    /// Prepended: drawn beneath everything already present
    Background,
    /// Appended: drawn above everything already present
    Foreground,
}

/// What clicking an entity does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAffordance {
    /// Not clickable
    Inert,
    /// Sends a `click` intent naming the entity; highlighted on hover
    Collect,
}

/// Per-frame visual state of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub facing: Facing,
    /// Radians, positive is clockwise on screen
    pub rotation: f32,
    pub tint: u32,
    pub animation: Option<String>,
    pub animation_speed: f32,
}

type PoseFn = fn(&EntityState, u64) -> Pose;

/// Static behaviour row for one kind
#[derive(Debug, Clone, Copy)]
pub struct KindBehavior {
    pub layer: PaintLayer,
    pub click: ClickAffordance,
    pose: PoseFn,
}

impl KindBehavior {
    pub fn pose(&self, entity: &EntityState, now_ms: u64) -> Pose {
        (self.pose)(entity, now_ms)
    }

    pub fn is_clickable(&self) -> bool {
        self.click != ClickAffordance::Inert
    }

    /// Tint to apply while the pointer hovers over the entity
    pub fn hover_tint(&self) -> Option<u32> {
        match self.click {
            ClickAffordance::Collect => Some(tint::HOVER),
            ClickAffordance::Inert => None,
        }
    }
}

const GENERIC: KindBehavior = KindBehavior {
    layer: PaintLayer::Background,
    click: ClickAffordance::Inert,
    pose: generic_pose,
};

const FISH: KindBehavior = KindBehavior {
    layer: PaintLayer::Foreground,
    click: ClickAffordance::Inert,
    pose: fish_pose,
};

const COLLECTIBLE: KindBehavior = KindBehavior {
    layer: PaintLayer::Background,
    click: ClickAffordance::Collect,
    pose: generic_pose,
};

/// Behaviour row for `kind`
pub fn behavior_for(kind: EntityKind) -> &'static KindBehavior {
    match kind {
        EntityKind::Fish => &FISH,
        EntityKind::Coin | EntityKind::TreasureChest => &COLLECTIBLE,
        EntityKind::Thing
        | EntityKind::Food
        | EntityKind::Tool
        | EntityKind::Bubble => &GENERIC,
    }
}

fn generic_pose(entity: &EntityState, now_ms: u64) -> Pose {
    Pose {
        position: interpolation::position_at(entity, now_ms),
        facing: Facing::Left,
        rotation: 0.0,
        tint: tint::NONE,
        animation: entity.attributes.animation().map(str::to_owned),
        animation_speed: fish::BASE_ANIMATION_SPEED,
    }
}

fn fish_pose(entity: &EntityState, now_ms: u64) -> Pose {
    let hungry = entity
        .attributes
        .hunger
        .is_some_and(|h| h > fish::HUNGRY_THRESHOLD);

    Pose {
        position: interpolation::position_at(entity, now_ms),
        facing: interpolation::facing(entity),
        rotation: interpolation::tilt(entity, fish::MAX_TILT),
        tint: if hungry { tint::HUNGRY } else { tint::NONE },
        animation: entity.attributes.animation().map(str::to_owned),
        animation_speed: fish::BASE_ANIMATION_SPEED
            + fish::ANIMATION_SPEED_PER_100PX * entity.speed / 100.0,
    }
}
