/// Frame loop constants
pub mod frame {
    /// Default display refresh rate in Hz
    pub const DEFAULT_RATE: u32 = 60;
    /// Highest frame rate the scheduler accepts
    pub const MAX_RATE: u32 = 240;
    /// Rolling window of frame durations kept for percentile reporting
    pub const TIMING_SAMPLES: usize = 240;
}

/// Fish pose constants
pub mod fish {
    use std::f32::consts::PI;

    /// Hunger above which the fish is tinted red
    pub const HUNGRY_THRESHOLD: f32 = 50.0;
    /// Maximum tilt when swimming straight up or down (20 degrees)
    pub const MAX_TILT: f32 = PI / 9.0;
    /// Animation playback speed when stationary
    pub const BASE_ANIMATION_SPEED: f32 = 0.1;
    /// Extra animation speed gained per 100 px/s of swimming speed
    pub const ANIMATION_SPEED_PER_100PX: f32 = 0.1;
}

/// Sprite tint colours (0xRRGGBB)
pub mod tint {
    pub const NONE: u32 = 0xFFFFFF;
    pub const HUNGRY: u32 = 0xFF0000;
    pub const HOVER: u32 = 0x00FF00;
}

/// Remote cursor constants
pub mod cursor {
    /// Default duration of a tap/pickup/use/select animation
    pub const DEFAULT_ACTION_MS: u64 = 400;
}

/// Network hand-off constants
pub mod net {
    /// Default inbound queue capacity (messages buffered between frames)
    pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;
    /// Maximum accepted envelope line length (1 MiB)
    pub const MAX_LINE_BYTES: usize = 1024 * 1024;
}
