//! Fixed-size record framing
//!
//! Boundary records carry no length prefix; the peer writes whole records of
//! a known size back to back. Integers are big-endian, floats are IEEE-754
//! little-endian bit patterns.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Errors that can occur while reading records
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Read exactly one record of `N` bytes
///
/// A peer closing mid-record is reported as [`FramingError::ConnectionClosed`]
/// like a clean close; the partial record is discarded.
pub async fn read_record<R: AsyncRead + Unpin, const N: usize>(
    stream: &mut R,
) -> Result<[u8; N], FramingError> {
    let mut buf = [0u8; N];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Frame builder for constructing records
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Write raw bytes
    pub fn write(mut self, data: &[u8]) -> Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Write a u16 (big-endian)
    pub fn write_u16(mut self, value: u16) -> Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Write a u32 (big-endian)
    pub fn write_u32(mut self, value: u32) -> Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Write a f32 (little-endian bit pattern)
    pub fn write_f32(mut self, value: f32) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Get the built frame
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

/// Frame reader for parsing records
pub struct FrameReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read n bytes
    pub fn read(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.position + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Some(slice)
    }

    /// Read a u16 (big-endian)
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a u32 (big-endian)
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a f32 (little-endian bit pattern)
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
