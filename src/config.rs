use std::path::PathBuf;
use std::str::FromStr;

use crate::net::session::SessionIdentity;
use crate::world::constants::{cursor, frame, net};

/// Configuration rejected by [`ClientConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("username cannot be empty")]
    EmptyUsername,
    #[error("frame_rate must be 1-{max}, got {got}")]
    FrameRate { got: u32, max: u32 },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local session username; used to drop our own echoed presence
    pub username: String,
    /// Render frames per second
    pub frame_rate: u32,
    /// Envelopes that may wait between frames before new ones are dropped
    pub inbound_capacity: usize,
    /// How long a cursor action animation plays
    pub action_duration_ms: u64,
    /// Longest accepted input line
    pub max_line_bytes: usize,
    /// Log a summary every this many frames
    pub summary_every_frames: u64,
    /// Replay file to read envelopes from (stdin when unset)
    pub replay_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: SessionIdentity::guest().username().to_string(),
            frame_rate: frame::DEFAULT_RATE,
            inbound_capacity: net::DEFAULT_INBOUND_CAPACITY,
            action_duration_ms: cursor::DEFAULT_ACTION_MS,
            max_line_bytes: net::MAX_LINE_BYTES,
            summary_every_frames: 600,
            replay_path: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ClientConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(username) = std::env::var("AQUARIUM_USERNAME") {
            if username.trim().is_empty() {
                tracing::warn!("AQUARIUM_USERNAME is blank, using {}", config.username);
            } else {
                config.username = username.trim().to_string();
            }
        }

        if let Some(rate) = parse_var::<u32>("FRAME_RATE") {
            if (1..=frame::MAX_RATE).contains(&rate) {
                config.frame_rate = rate;
            } else {
                tracing::warn!("FRAME_RATE must be 1-{}, using default", frame::MAX_RATE);
            }
        }

        if let Some(capacity) = parse_var::<usize>("INBOUND_CAPACITY") {
            if capacity > 0 {
                config.inbound_capacity = capacity;
            } else {
                tracing::warn!("INBOUND_CAPACITY must be > 0, using default");
            }
        }

        if let Some(ms) = parse_var("ACTION_ANIMATION_MS") {
            config.action_duration_ms = ms;
        }

        if let Some(bytes) = parse_var::<usize>("MAX_LINE_BYTES") {
            if bytes > 0 {
                config.max_line_bytes = bytes;
            } else {
                tracing::warn!("MAX_LINE_BYTES must be > 0, using default");
            }
        }

        if let Some(frames) = parse_var::<u64>("SUMMARY_EVERY_FRAMES") {
            if frames > 0 {
                config.summary_every_frames = frames;
            } else {
                tracing::warn!("SUMMARY_EVERY_FRAMES must be > 0, using default");
            }
        }

        if let Ok(path) = std::env::var("REPLAY_PATH") {
            if !path.is_empty() {
                config.replay_path = Some(PathBuf::from(path));
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if self.frame_rate == 0 || self.frame_rate > frame::MAX_RATE {
            return Err(ConfigError::FrameRate {
                got: self.frame_rate,
                max: frame::MAX_RATE,
            });
        }
        if self.inbound_capacity == 0 {
            return Err(ConfigError::Zero("inbound_capacity"));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Zero("max_line_bytes"));
        }
        if self.summary_every_frames == 0 {
            return Err(ConfigError::Zero("summary_every_frames"));
        }
        Ok(())
    }

    pub fn session(&self) -> SessionIdentity {
        SessionIdentity::new(self.username.clone())
    }
}
