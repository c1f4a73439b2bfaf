//! Frame codec capability
//!
//! The replay core treats image decoding as an opaque capability: a codec
//! turns an encoded frame payload into a raw RGBA surface of a requested
//! size. Implementations must be pure and safe to call concurrently from
//! the buffer-ingestion and live-append paths.

pub mod png;

pub use self::png::PngCodec;

/// A raw RGBA8 pixel surface produced by a codec
#[derive(Debug, Clone)]
pub struct PixelSurface {
    /// Tightly packed RGBA pixel data (width * height * 4 bytes)
    pub data: Vec<u8>,

    /// Surface width in pixels
    pub width: u32,

    /// Surface height in pixels
    pub height: u32,
}

impl PixelSurface {
    /// Expected byte length for the surface dimensions
    pub fn byte_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

/// Decodes encoded frame payloads into fixed-size RGBA surfaces.
///
/// A return of `None` means the payload could not be decoded; callers
/// treat that as a recoverable, frame-level condition.
pub trait FrameCodec: Send + Sync {
    /// Read the native dimensions of an encoded payload without
    /// committing to a full decode. Returns `None` for undecodable input.
    fn probe(&self, payload: &[u8]) -> Option<(u32, u32)>;

    /// Decode a payload and scale it to the target size.
    fn decode(&self, payload: &[u8], target_width: u32, target_height: u32)
        -> Option<PixelSurface>;
}
