/// Wire protocol constants - shared with the companion device, do not change
pub mod protocol {
    /// Discovery magic, ASCII "_DIS"
    pub const DISCOVERY_MAGIC: u32 = 0x5F44_4953;
    /// Discovery protocol version
    pub const DISCOVERY_VERSION: u16 = 1;
    /// UDP port the companion listens on for advertisements
    pub const DISCOVERY_PORT: u16 = 19191;
    /// TCP port of the boundary control channel
    pub const SYNC_TCP_PORT: u16 = 1191;
    /// Advertisement period in milliseconds
    pub const BROADCAST_INTERVAL_MS: u64 = 1000;

    /// magic(4) + version(2) + tcp_port(2) + checksum(4)
    pub const ADVERTISEMENT_SIZE: usize = 12;
    /// Bytes covered by the advertisement checksum
    pub const ADVERTISEMENT_CHECKSUM_OFFSET: usize = 8;

    /// Number of boundary corners carried by one frame
    pub const FRAME_CORNER_COUNT: usize = 4;
    /// Number of floats in the legacy 3x4 pose matrix
    pub const FRAME_POSE_FLOATS: usize = 12;
    /// extents(2 * 4) + corners(4 * 3 * 4) + pose(12 * 4)
    pub const BOUNDARY_FRAME_SIZE: usize = 2 * 4 + FRAME_CORNER_COUNT * 3 * 4 + FRAME_POSE_FLOATS * 4;

    /// FNV-1a 32-bit offset basis
    pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
    /// FNV-1a 32-bit prime
    pub const FNV_PRIME: u32 = 16_777_619;
}

/// Boundary geometry constants
pub mod geometry {
    /// Height of generated walls above the floor
    pub const WALL_HEIGHT: f32 = 2.4;
    /// Corners moving less than this (meters) are not re-committed
    pub const RECOMMIT_THRESHOLD: f32 = 0.005;
    /// Upper bound accepted for configured wall height
    pub const MAX_WALL_HEIGHT: f32 = 10.0;
}

/// Comfort consumer defaults
pub mod comfort {
    /// Auto-turn arms when the nearest wall is closer than this (meters)
    pub const AUTO_TURN_ACTIVATION_DISTANCE: f32 = 0.4;
    /// An armed wall re-arms once the user is this much further than the
    /// activation distance (meters)
    pub const AUTO_TURN_DEACTIVATION_DISTANCE: f32 = 0.3;
    /// Snap turn magnitude in degrees
    pub const AUTO_TURN_SNAP_ANGLE_DEG: f32 = 45.0;
    /// Largest accepted snap turn in degrees
    pub const MAX_SNAP_ANGLE_DEG: f32 = 180.0;
    /// Smooth turn angular rate in degrees per second
    pub const AUTO_TURN_SPEED_DEG_PER_SEC: f32 = 90.0;
    /// Radius around walls where vestibular motion is synthesized (meters)
    pub const VESTIBULAR_MOTION_RADIUS: f32 = 0.5;
    /// Fraction of the angle to the nearest wall that triggers a ratchet step
    pub const VIEW_RATCHET_PERCENT: f32 = 0.5;
    /// Comfort tick rate when driven by the binary
    pub const TICK_RATE: u32 = 90;
    /// Rotations smaller than this (radians) are not emitted
    pub const MIN_ROTATION: f32 = 1.0e-4;
}
