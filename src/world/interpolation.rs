//! Motion interpolation between server updates
//!
//! Positions are recomputed from scratch every frame from two anchors (the
//! last reported position and the destination) plus the local receive time.
//! There is no per-frame state, so the result does not depend on how often
//! the renderer asks.

use crate::util::vec2::Vec2;
use crate::world::entity::EntityState;

/// Which way a sprite faces horizontally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
}

/// Seconds elapsed since the entity's last update (never negative)
#[inline]
fn elapsed_secs(entity: &EntityState, now_ms: u64) -> f32 {
    now_ms.saturating_sub(entity.last_update_ms) as f32 / 1000.0
}

/// Anchor-to-destination leg as (dx, dy, length).
///
/// Computed in f64: two finite f32 anchors can be further apart than f32
/// can represent.
#[inline]
fn leg(entity: &EntityState) -> (f64, f64, f64) {
    let dx = entity.destination.x as f64 - entity.anchor.x as f64;
    let dy = entity.destination.y as f64 - entity.anchor.y as f64;
    (dx, dy, dx.hypot(dy))
}

/// Fraction of the anchor-to-destination leg covered at `now_ms`.
///
/// `None` for a stationary entity (`speed == 0`) or a zero-length leg.
/// Values of 1.0 or more mean the entity has arrived.
fn progress(entity: &EntityState, now_ms: u64) -> Option<f64> {
    if entity.is_stationary() {
        return None;
    }

    let (_, _, total_distance) = leg(entity);
    if total_distance == 0.0 {
        return None;
    }

    let distance_covered = entity.speed as f64 * elapsed_secs(entity, now_ms) as f64;
    Some(distance_covered / total_distance)
}

/// Rendered position of `entity` at local time `now_ms`
pub fn position_at(entity: &EntityState, now_ms: u64) -> Vec2 {
    // speed 0 is the stationary sentinel; a zero-length leg is already there
    if entity.is_stationary() {
        return entity.anchor;
    }

    match progress(entity, now_ms) {
        // Clamp so the entity never overshoots
        Some(p) if p < 1.0 => {
            let (dx, dy, _) = leg(entity);
            Vec2::new(
                (entity.anchor.x as f64 + dx * p) as f32,
                (entity.anchor.y as f64 + dy * p) as f32,
            )
        }
        _ => entity.destination,
    }
}

/// Horizontal facing derived from the current leg
pub fn facing(entity: &EntityState) -> Facing {
    if entity.destination.x > entity.anchor.x {
        Facing::Right
    } else {
        Facing::Left
    }
}

/// Body tilt in radians, bounded by `max_tilt`.
///
/// Grows with the vertical share of the heading (sin²) so horizontal
/// swimming is level and vertical swimming is fully tilted. The sign makes
/// the nose point along the heading whichever way the sprite faces.
pub fn tilt(entity: &EntityState, max_tilt: f32) -> f32 {
    let (dx, dy, _) = leg(entity);
    let heading = dy.atan2(dx) as f32;
    let (sin, cos) = heading.sin_cos();

    let magnitude = sin * sin * max_tilt;
    let up_or_down = if sin > 0.0 { 1.0 } else { -1.0 };
    let left_or_right = if cos > 0.0 { 1.0 } else { -1.0 };

    up_or_down * magnitude * left_or_right
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::entity::{EntityKind, ServerRecord};
    use std::f32::consts::PI;

    const T: u64 = 1_700_000_000_000;

    fn has_arrived(entity: &EntityState, now_ms: u64) -> bool {
        progress(entity, now_ms).map_or(true, |p| p >= 1.0)
    }

    fn moving(anchor: Vec2, destination: Vec2, speed: f32) -> EntityState {
        let mut entity = EntityState::from_record(ServerRecord::with_id("e"), T);
        entity.kind = EntityKind::Fish;
        entity.anchor = anchor;
        entity.destination = destination;
        entity.speed = speed;
        entity
    }

    #[test]
    fn test_fish_scenario() {
        let fish = moving(Vec2::ZERO, Vec2::new(100.0, 0.0), 50.0);
        assert_eq!(position_at(&fish, T), Vec2::ZERO);
        assert_eq!(position_at(&fish, T + 1000), Vec2::new(50.0, 0.0));
        assert_eq!(position_at(&fish, T + 3000), Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_stationary_never_moves_or_nans() {
        let entity = moving(Vec2::new(10.0, 20.0), Vec2::new(300.0, 20.0), 0.0);
        for t in [T, T + 1, T + 1000, T + 86_400_000] {
            let p = position_at(&entity, t);
            assert_eq!(p, Vec2::new(10.0, 20.0));
            assert!(p.is_finite());
        }
        assert_eq!(progress(&entity, T + 1000), None);
    }

    #[test]
    fn test_zero_distance_returns_destination() {
        let entity = moving(Vec2::new(5.0, 5.0), Vec2::new(5.0, 5.0), 40.0);
        let p = position_at(&entity, T + 250);
        assert_eq!(p, Vec2::new(5.0, 5.0));
        assert!(p.is_finite());
        assert!(has_arrived(&entity, T));
    }

    #[test]
    fn test_arrival_clamp_is_sticky() {
        let entity = moving(Vec2::ZERO, Vec2::new(30.0, 40.0), 10.0); // 50px at 10px/s = 5s
        assert!(!has_arrived(&entity, T + 4999));
        for t in [T + 5000, T + 5001, T + 60_000, T + 3_600_000] {
            assert_eq!(position_at(&entity, t), Vec2::new(30.0, 40.0));
            assert!(has_arrived(&entity, t));
        }
    }

    #[test]
    fn test_diagonal_interpolation() {
        let entity = moving(Vec2::ZERO, Vec2::new(30.0, 40.0), 10.0);
        let p = position_at(&entity, T + 2500);
        assert!(p.approx_eq(Vec2::new(15.0, 20.0), 1e-4));
    }

    #[test]
    fn test_clock_before_update_holds_anchor() {
        let entity = moving(Vec2::ZERO, Vec2::new(100.0, 0.0), 50.0);
        assert_eq!(position_at(&entity, T - 5000), Vec2::ZERO);
    }

    #[test]
    fn test_independent_of_query_cadence() {
        let entity = moving(Vec2::ZERO, Vec2::new(100.0, 0.0), 50.0);
        // Querying many intermediate times does not change a later answer
        for t in (T..T + 1000).step_by(16) {
            position_at(&entity, t);
        }
        assert_eq!(position_at(&entity, T + 1000), Vec2::new(50.0, 0.0));
    }

    #[test]
    fn test_extreme_anchors_stay_finite() {
        // The leg overflows f32 even though both ends are finite
        let entity = moving(Vec2::new(3e38, 0.0), Vec2::new(-3e38, 0.0), 10.0);
        for t in [T, T + 1000, T + 86_400_000] {
            let p = position_at(&entity, t);
            assert!(p.is_finite(), "{:?} at {}", p, t);
            assert!(p.x <= 3e38 && p.x > 2.9e38);
        }
        assert!(progress(&entity, T + 1000).unwrap().is_finite());
        assert!(tilt(&entity, PI / 9.0).is_finite());
        assert_eq!(facing(&entity), Facing::Left);
    }

    #[test]
    fn test_facing() {
        assert_eq!(facing(&moving(Vec2::ZERO, Vec2::new(10.0, 0.0), 1.0)), Facing::Right);
        assert_eq!(facing(&moving(Vec2::ZERO, Vec2::new(-10.0, 0.0), 1.0)), Facing::Left);
        assert_eq!(facing(&moving(Vec2::ZERO, Vec2::ZERO, 0.0)), Facing::Left);
    }

    #[test]
    fn test_tilt() {
        let max = PI / 9.0;
        // Level swimming: no tilt
        assert!(tilt(&moving(Vec2::ZERO, Vec2::new(10.0, 0.0), 1.0), max).abs() < 1e-6);
        // Straight down (y grows downward), heading right-ish sign convention
        let down = tilt(&moving(Vec2::ZERO, Vec2::new(0.0, 10.0), 1.0), max);
        assert!((down.abs() - max).abs() < 1e-5);
        // 45 degrees down-right: half tilt, positive
        let diag = tilt(&moving(Vec2::ZERO, Vec2::new(10.0, 10.0), 1.0), max);
        assert!((diag - max / 2.0).abs() < 1e-5);
        // 45 degrees down-left: mirrored sign
        let diag_left = tilt(&moving(Vec2::ZERO, Vec2::new(-10.0, 10.0), 1.0), max);
        assert!((diag_left + max / 2.0).abs() < 1e-5);
        // Parked: finite
        assert!(tilt(&moving(Vec2::ZERO, Vec2::ZERO, 0.0), max).is_finite());
    }
}
