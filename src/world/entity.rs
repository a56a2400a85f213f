//! Synchronized entity state and the inbound records that drive it
//!
//! An [`EntityState`] is the local mirror of one server-owned object (fish,
//! food, coin, ...). It is created from a [`ServerRecord`] the first time an
//! id is seen and merged in place by every later record for that id.
//!
//! Records are decoded leniently: a field with the wrong type is treated as
//! absent rather than failing the record, so one sloppy field never costs the
//! whole entity. Only a missing or unusable `id` rejects a record.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::vec2::Vec2;
use crate::world::lenient;

/// Server-assigned identity (the server calls it `label`)
pub type EntityId = String;

/// Behavioural category of an entity
///
/// Unrecognized kinds fall back to [`EntityKind::Thing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[default]
    Thing,
    Fish,
    Food,
    Coin,
    Tool,
    Bubble,
    TreasureChest,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Thing,
        EntityKind::Fish,
        EntityKind::Food,
        EntityKind::Coin,
        EntityKind::Tool,
        EntityKind::Bubble,
        EntityKind::TreasureChest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Thing => "Thing",
            EntityKind::Fish => "Fish",
            EntityKind::Food => "Food",
            EntityKind::Coin => "Coin",
            EntityKind::Tool => "Tool",
            EntityKind::Bubble => "Bubble",
            EntityKind::TreasureChest => "TreasureChest",
        }
    }

    /// Parse a kind name, ignoring case, `_`, `-` and spaces
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == normalized)
    }

    /// Resolve the kind declared by a record.
    ///
    /// An explicit `kind` wins. Otherwise the class hierarchy (most generic
    /// first) is walked from its most specific end, so `["Thing", "Food",
    /// "Flake"]` resolves to `Food`. Returns `None` when nothing is recognized.
    pub fn resolve(kind: Option<&str>, hierarchy: &[String]) -> Option<Self> {
        kind.and_then(Self::from_name).or_else(|| {
            hierarchy
                .iter()
                .rev()
                .find_map(|name| Self::from_name(name))
        })
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload with a fixed schema.
///
/// Every field is optional. On merge, fields present in the update overwrite
/// the stored value and absent ones keep it. Fields outside this schema are
/// dropped at decode time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    #[serde(default, deserialize_with = "lenient::number")]
    pub width: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub height: Option<f32>,
    /// width / height; used to derive height when only width is sent
    #[serde(default, deserialize_with = "lenient::number")]
    pub aspect_ratio: Option<f32>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub spritesheet_json: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub default_texture: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub default_animation: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub animation_prefix: Option<String>,
    /// Animation-state name chosen by the server (e.g. "swim", "eat")
    #[serde(default, deserialize_with = "lenient::text")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub hunger: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub health: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub value: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub nutrition: Option<f32>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub time_created: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lifetime: Option<f32>,
}

macro_rules! merge_present {
    ($dst:expr, $src:expr; $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
            }
        )+
    };
}

impl EntityAttributes {
    /// Overwrite every field present in `patch`
    pub fn merge(&mut self, patch: EntityAttributes) {
        merge_present!(self, patch;
            width, height, aspect_ratio, spritesheet_json, default_texture,
            default_animation, animation_prefix, state, hunger, health,
            value, nutrition, time_created, lifetime,
        );
    }

    /// Rendered size, deriving height from the aspect ratio when needed
    pub fn size(&self) -> Option<Vec2> {
        let width = self.width.filter(|w| *w > 0.0)?;
        let height = self.height.filter(|h| *h > 0.0).or_else(|| {
            self.aspect_ratio
                .filter(|ratio| *ratio > 0.0)
                .map(|ratio| width / ratio)
        })?;
        Some(Vec2::new(width, height))
    }

    /// Animation to play: the server's state name, else the default animation
    pub fn animation(&self) -> Option<&str> {
        self.state
            .as_deref()
            .or(self.default_animation.as_deref())
    }
}

/// One entity record as sent by the server (full sync element or delta)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerRecord {
    #[serde(alias = "label", deserialize_with = "lenient::id")]
    pub id: EntityId,
    #[serde(default, deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub class_hierarchy: Vec<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub destination_x: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub destination_y: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub speed: Option<f32>,
    /// Server clock; informational only, never used for interpolation
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub update_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub remove: bool,
    #[serde(flatten)]
    pub attributes: EntityAttributes,
}

impl ServerRecord {
    /// Decode a single record from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, RecordError> {
        if !value.is_object() {
            return Err(RecordError::NotAnObject);
        }
        serde_json::from_value(value).map_err(RecordError::Invalid)
    }

    /// Minimal record carrying only an id (tests, removal notices)
    pub fn with_id(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// True when the record names a kind at all (recognized or not)
    pub fn declares_kind(&self) -> bool {
        self.kind.is_some() || !self.class_hierarchy.is_empty()
    }

    pub fn resolved_kind(&self) -> Option<EntityKind> {
        EntityKind::resolve(self.kind.as_deref(), &self.class_hierarchy)
    }

    fn position(&self) -> Option<Vec2> {
        Some(Vec2::new(self.x?, self.y?))
    }

    fn destination(&self) -> Option<Vec2> {
        Some(Vec2::new(self.destination_x?, self.destination_y?))
    }
}

/// A record that could not be interpreted at all
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("invalid record: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Motion anchors extracted from a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Motion {
    pub anchor: Vec2,
    pub destination: Vec2,
    pub speed: f32,
    /// Position was missing and `fallback` was used
    pub degraded: bool,
}

impl Motion {
    /// Extract motion, freezing at `fallback` when the position is unusable.
    ///
    /// A missing destination means "stay put"; a missing, zero, negative or
    /// non-finite speed means stationary.
    pub fn from_record(record: &ServerRecord, fallback: Vec2) -> Self {
        match record.position() {
            Some(anchor) => Self {
                anchor,
                destination: record.destination().unwrap_or(anchor),
                speed: record.speed.filter(|s| *s > 0.0).unwrap_or(0.0),
                degraded: false,
            },
            None => Self {
                anchor: fallback,
                destination: fallback,
                speed: 0.0,
                degraded: true,
            },
        }
    }
}

/// The reconciled, interpolation-ready mirror of one server entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Server-reported position as of `last_update_ms`
    pub anchor: Vec2,
    pub destination: Vec2,
    /// Pixels per second; 0 means stationary
    pub speed: f32,
    /// Local wall-clock time (ms) the latest update was received
    pub last_update_ms: u64,
    pub server_update_time: Option<f64>,
    pub attributes: EntityAttributes,
    /// Paint-order key assigned by the registry
    pub(crate) paint_key: i64,
}

impl EntityState {
    /// Build a new entity from its first record
    pub fn from_record(record: ServerRecord, now_ms: u64) -> Self {
        let kind = match record.resolved_kind() {
            Some(kind) => kind,
            None => {
                if record.declares_kind() {
                    warn!(
                        "Entity {} has unrecognized kind {:?} / {:?}, using Thing",
                        record.id, record.kind, record.class_hierarchy
                    );
                }
                EntityKind::Thing
            }
        };

        let motion = Motion::from_record(&record, Vec2::ZERO);
        if motion.degraded {
            warn!("Entity {} created without a position, holding at origin", record.id);
        }

        Self {
            id: record.id,
            kind,
            anchor: motion.anchor,
            destination: motion.destination,
            speed: motion.speed,
            last_update_ms: now_ms,
            server_update_time: record.update_time,
            attributes: record.attributes,
            paint_key: 0,
        }
    }

    /// Merge a later record for the same id.
    ///
    /// Motion anchors and the timestamp are replaced outright; attributes are
    /// merged field by field. The kind is fixed at creation. Returns `false`
    /// when the record's position was unusable and the entity was frozen.
    pub fn apply(&mut self, record: ServerRecord, now_ms: u64) -> bool {
        debug_assert_eq!(self.id, record.id);

        if let Some(kind) = record.resolved_kind() {
            if kind != self.kind {
                debug!(
                    "Entity {} update declares kind {}, keeping {}",
                    self.id, kind, self.kind
                );
            }
        }

        // Freeze where it currently appears rather than jumping
        let current = self.position_at(now_ms);
        let motion = Motion::from_record(&record, current);

        self.anchor = motion.anchor;
        self.destination = motion.destination;
        self.speed = motion.speed;
        self.last_update_ms = now_ms;
        if record.update_time.is_some() {
            self.server_update_time = record.update_time;
        }
        self.attributes.merge(record.attributes);

        !motion.degraded
    }

    /// Interpolated position at `now_ms`
    #[inline]
    pub fn position_at(&self, now_ms: u64) -> Vec2 {
        crate::world::interpolation::position_at(self, now_ms)
    }

    pub fn is_stationary(&self) -> bool {
        self.speed <= 0.0 || self.anchor == self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ServerRecord {
        ServerRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(EntityKind::from_name("Fish"), Some(EntityKind::Fish));
        assert_eq!(EntityKind::from_name("coin"), Some(EntityKind::Coin));
        assert_eq!(EntityKind::from_name("treasure_chest"), Some(EntityKind::TreasureChest));
        assert_eq!(EntityKind::from_name("Treasure-Chest"), Some(EntityKind::TreasureChest));
        assert_eq!(EntityKind::from_name("Kraken"), None);
    }

    #[test]
    fn test_kind_resolution_prefers_explicit_kind() {
        let hierarchy = vec!["Thing".to_string(), "Food".to_string()];
        assert_eq!(EntityKind::resolve(Some("Coin"), &hierarchy), Some(EntityKind::Coin));
    }

    #[test]
    fn test_kind_resolution_walks_hierarchy_from_most_specific() {
        let hierarchy: Vec<String> = ["Thing", "Food", "Flake"].iter().map(|s| s.to_string()).collect();
        assert_eq!(EntityKind::resolve(None, &hierarchy), Some(EntityKind::Food));

        // Unrecognized explicit kind still falls through to the hierarchy
        assert_eq!(EntityKind::resolve(Some("Pellet"), &hierarchy), Some(EntityKind::Food));
        assert_eq!(EntityKind::resolve(Some("Pellet"), &[]), None);
    }

    #[test]
    fn test_record_decodes_full_shape() {
        let r = record(json!({
            "id": "f1", "kind": "Fish", "x": 0, "y": 0,
            "destination_x": 100, "destination_y": 0, "speed": 50,
            "update_time": 1700000000000.0, "hunger": 60, "state": "swim",
        }));
        assert_eq!(r.id, "f1");
        assert_eq!(r.resolved_kind(), Some(EntityKind::Fish));
        assert_eq!(r.speed, Some(50.0));
        assert_eq!(r.attributes.hunger, Some(60.0));
        assert_eq!(r.attributes.state.as_deref(), Some("swim"));
        assert!(!r.remove);
    }

    #[test]
    fn test_record_accepts_label_alias_and_numeric_id() {
        assert_eq!(record(json!({"label": "abc"})).id, "abc");
        assert_eq!(record(json!({"id": 42})).id, "42");
    }

    #[test]
    fn test_record_without_id_is_rejected() {
        assert!(ServerRecord::from_value(json!({"x": 1, "y": 2})).is_err());
        assert!(ServerRecord::from_value(json!({"id": null})).is_err());
        assert!(ServerRecord::from_value(json!({"id": ""})).is_err());
        assert!(matches!(
            ServerRecord::from_value(json!("f1")),
            Err(RecordError::NotAnObject)
        ));
    }

    #[test]
    fn test_ill_typed_fields_become_absent() {
        let r = record(json!({
            "id": "f1", "x": "12.5", "y": true, "speed": "fast",
            "remove": "yes", "class_hierarchy": ["Thing", 7, "Coin"], "width": null,
        }));
        assert_eq!(r.x, Some(12.5));
        assert_eq!(r.y, None);
        assert_eq!(r.speed, None);
        assert!(!r.remove);
        assert_eq!(r.class_hierarchy, vec!["Thing".to_string(), "Coin".to_string()]);
        assert_eq!(r.attributes.width, None);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let r = record(json!({"id": "f1", "texture_file": "fish.png", "__proto__": {}}));
        assert_eq!(r.attributes, EntityAttributes::default());
    }

    #[test]
    fn test_from_record_unknown_kind_defaults_to_thing() {
        let entity = EntityState::from_record(record(json!({"id": "k", "kind": "Kraken", "x": 1, "y": 2})), 0);
        assert_eq!(entity.kind, EntityKind::Thing);
        assert_eq!(entity.anchor, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_from_record_missing_motion_is_stationary() {
        let entity = EntityState::from_record(record(json!({"id": "f1", "x": 10, "y": 20})), 500);
        assert_eq!(entity.destination, entity.anchor);
        assert_eq!(entity.speed, 0.0);
        assert_eq!(entity.last_update_ms, 500);
        assert!(entity.is_stationary());
    }

    #[test]
    fn test_negative_speed_is_stationary() {
        let entity = EntityState::from_record(
            record(json!({"id": "f1", "x": 0, "y": 0, "destination_x": 10, "destination_y": 0, "speed": -5})),
            0,
        );
        assert_eq!(entity.speed, 0.0);
    }

    #[test]
    fn test_apply_replaces_motion_and_merges_attributes() {
        let mut entity = EntityState::from_record(
            record(json!({"id": "f1", "kind": "Fish", "x": 0, "y": 0, "speed": 10, "hunger": 20, "state": "swim"})),
            0,
        );
        let ok = entity.apply(
            record(json!({"id": "f1", "x": 5, "y": 6, "destination_x": 50, "destination_y": 6, "speed": 30, "hunger": 70})),
            1000,
        );
        assert!(ok);
        assert_eq!(entity.anchor, Vec2::new(5.0, 6.0));
        assert_eq!(entity.destination, Vec2::new(50.0, 6.0));
        assert_eq!(entity.speed, 30.0);
        assert_eq!(entity.last_update_ms, 1000);
        assert_eq!(entity.attributes.hunger, Some(70.0));
        // Absent attribute keeps previous value
        assert_eq!(entity.attributes.state.as_deref(), Some("swim"));
    }

    #[test]
    fn test_apply_without_position_freezes_at_current_position() {
        let mut entity = EntityState::from_record(
            record(json!({"id": "f1", "x": 0, "y": 0, "destination_x": 100, "destination_y": 0, "speed": 50})),
            0,
        );
        let ok = entity.apply(record(json!({"id": "f1", "hunger": 10})), 1000);
        assert!(!ok);
        assert_eq!(entity.anchor, Vec2::new(50.0, 0.0));
        assert_eq!(entity.speed, 0.0);
        assert_eq!(entity.position_at(5000), Vec2::new(50.0, 0.0));
    }

    #[test]
    fn test_apply_keeps_original_kind() {
        let mut entity = EntityState::from_record(record(json!({"id": "c1", "kind": "Coin", "x": 0, "y": 0})), 0);
        entity.apply(record(json!({"id": "c1", "kind": "Fish", "x": 1, "y": 1})), 10);
        assert_eq!(entity.kind, EntityKind::Coin);
    }

    #[test]
    fn test_attribute_size() {
        let mut attrs = EntityAttributes {
            width: Some(20.0),
            aspect_ratio: Some(2.0),
            ..Default::default()
        };
        assert_eq!(attrs.size(), Some(Vec2::new(20.0, 10.0)));

        attrs.height = Some(15.0);
        assert_eq!(attrs.size(), Some(Vec2::new(20.0, 15.0)));

        attrs.width = None;
        assert_eq!(attrs.size(), None);
    }

    #[test]
    fn test_attribute_animation_prefers_state() {
        let mut attrs = EntityAttributes {
            default_animation: Some("idle".into()),
            ..Default::default()
        };
        assert_eq!(attrs.animation(), Some("idle"));
        attrs.state = Some("eat".into());
        assert_eq!(attrs.animation(), Some("eat"));
    }
}
