//! Wire codec for the discovery advertisement and the boundary record
//!
//! Both records are packed with no padding. Integers travel big-endian;
//! floats travel as little-endian IEEE-754 bit patterns.
//!
//! Advertisement (12 bytes):
//!
//! | offset | field    | type |
//! |--------|----------|------|
//! | 0      | magic    | u32  |
//! | 4      | version  | u16  |
//! | 6      | tcp_port | u16  |
//! | 8      | checksum | u32  |
//!
//! Boundary record (104 bytes): play-area extents X/Z (2 x f32), four corners
//! relative to the peer's head (4 x 3 x f32), legacy 3x4 pose (12 x f32).

use serde::Serialize;

use super::framing::{FrameBuilder, FrameReader};
use crate::constants::protocol::{
    ADVERTISEMENT_CHECKSUM_OFFSET, ADVERTISEMENT_SIZE, BOUNDARY_FRAME_SIZE, DISCOVERY_MAGIC,
    DISCOVERY_VERSION, FNV_OFFSET_BASIS, FNV_PRIME, FRAME_CORNER_COUNT, FRAME_POSE_FLOATS,
};
use crate::util::vec3::Vec3;

/// Errors raised while decoding wire records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Wrong record length: {actual} bytes (expected {expected})")]
    Length { expected: usize, actual: usize },
    #[error("Bad magic: {0:#010x}")]
    BadMagic(u32),
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u16),
    #[error("Checksum mismatch: computed {computed:#010x}, received {received:#010x}")]
    ChecksumMismatch { computed: u32, received: u32 },
}

/// FNV-1a (32-bit) over raw bytes
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Discovery advertisement, built once and re-sent unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveryAdvertisement {
    pub magic: u32,
    pub version: u16,
    pub tcp_port: u16,
    pub checksum: u32,
}

impl DiscoveryAdvertisement {
    pub fn new(tcp_port: u16) -> Self {
        let mut advertisement = Self {
            magic: DISCOVERY_MAGIC,
            version: DISCOVERY_VERSION,
            tcp_port,
            checksum: 0,
        };
        advertisement.checksum = checksum(&advertisement.header_bytes());
        advertisement
    }

    /// Network-order bytes covered by the checksum
    fn header_bytes(&self) -> Vec<u8> {
        FrameBuilder::with_capacity(ADVERTISEMENT_CHECKSUM_OFFSET)
            .write_u32(self.magic)
            .write_u16(self.version)
            .write_u16(self.tcp_port)
            .build()
    }

    pub fn encode(&self) -> [u8; ADVERTISEMENT_SIZE] {
        let bytes = FrameBuilder::with_capacity(ADVERTISEMENT_SIZE)
            .write(&self.header_bytes())
            .write_u32(self.checksum)
            .build();
        let mut out = [0u8; ADVERTISEMENT_SIZE];
        out.copy_from_slice(&bytes);
        out
    }

    /// Decodes and verifies magic, version and checksum
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() != ADVERTISEMENT_SIZE {
            return Err(WireError::Length {
                expected: ADVERTISEMENT_SIZE,
                actual: data.len(),
            });
        }

        let mut reader = FrameReader::new(data);
        let (Some(magic), Some(version), Some(tcp_port), Some(received)) = (
            reader.read_u32(),
            reader.read_u16(),
            reader.read_u16(),
            reader.read_u32(),
        ) else {
            return Err(WireError::Length {
                expected: ADVERTISEMENT_SIZE,
                actual: data.len(),
            });
        };

        if magic != DISCOVERY_MAGIC {
            return Err(WireError::BadMagic(magic));
        }
        if version != DISCOVERY_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let computed = checksum(&data[..ADVERTISEMENT_CHECKSUM_OFFSET]);
        if computed != received {
            return Err(WireError::ChecksumMismatch { computed, received });
        }

        Ok(Self {
            magic,
            version,
            tcp_port,
            checksum: received,
        })
    }
}

/// Encoded advertisement for `tcp_port`
pub fn encode_advertisement(tcp_port: u16) -> [u8; ADVERTISEMENT_SIZE] {
    DiscoveryAdvertisement::new(tcp_port).encode()
}

/// One boundary update from the peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryWireFrame {
    /// Play-area extent along X
    pub play_area_x: f32,
    /// Play-area extent along Z
    pub play_area_z: f32,
    /// Boundary corners in the peer's head frame
    pub corners: [Vec3; FRAME_CORNER_COUNT],
    /// Received for compatibility, never used for the transform
    pub legacy_pose: [f32; FRAME_POSE_FLOATS],
}

impl BoundaryWireFrame {
    pub fn new(play_area_x: f32, play_area_z: f32, corners: [Vec3; FRAME_CORNER_COUNT]) -> Self {
        Self {
            play_area_x,
            play_area_z,
            corners,
            legacy_pose: [0.0; FRAME_POSE_FLOATS],
        }
    }

    /// Sentinel frame meaning "boundary cleared"
    pub fn unavailable() -> Self {
        Self::new(0.0, 0.0, [Vec3::ZERO; FRAME_CORNER_COUNT])
    }

    /// Non-positive extents (or NaN) mean the peer has no boundary
    pub fn is_unavailable(&self) -> bool {
        !(self.play_area_x > 0.0 && self.play_area_z > 0.0)
    }

    pub fn encode(&self) -> [u8; BOUNDARY_FRAME_SIZE] {
        let mut builder = FrameBuilder::with_capacity(BOUNDARY_FRAME_SIZE)
            .write_f32(self.play_area_x)
            .write_f32(self.play_area_z);
        for corner in &self.corners {
            builder = builder.write_f32(corner.x).write_f32(corner.y).write_f32(corner.z);
        }
        for value in &self.legacy_pose {
            builder = builder.write_f32(*value);
        }

        let mut out = [0u8; BOUNDARY_FRAME_SIZE];
        out.copy_from_slice(&builder.build());
        out
    }

    /// Decodes one whole record; any other length is malformed
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let malformed = WireError::Length {
            expected: BOUNDARY_FRAME_SIZE,
            actual: data.len(),
        };
        if data.len() != BOUNDARY_FRAME_SIZE {
            return Err(malformed);
        }

        let mut reader = FrameReader::new(data);
        let mut next = || reader.read_f32().ok_or_else(|| malformed.clone());

        let play_area_x = next()?;
        let play_area_z = next()?;
        let mut corners = [Vec3::ZERO; FRAME_CORNER_COUNT];
        for corner in &mut corners {
            *corner = Vec3::new(next()?, next()?, next()?);
        }
        let mut legacy_pose = [0.0; FRAME_POSE_FLOATS];
        for value in &mut legacy_pose {
            *value = next()?;
        }

        Ok(Self {
            play_area_x,
            play_area_z,
            corners,
            legacy_pose,
        })
    }
}
