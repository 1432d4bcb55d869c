//! Pixel storage for the acquisition pipeline.
//!
//! - [`ImgBuffer`]: one channel of raw pixel bytes plus its metadata.
//! - [`ImageFrame`]: the channels captured at one instant, keyed by channel index.
//!
//! Both are preallocated by the circular buffer and then mutated in place on
//! every insert, so nothing here allocates once the frame has been sized.
//!
//! # Storage
//! Pixels are stored as a raw byte vector (`Vec<u8>`):
//! - 1 byte per pixel: 8-bit grayscale
//! - 2 bytes per pixel: 16-bit grayscale, native endianness as delivered by the camera
//! - 4 bytes per pixel: 32-bit grayscale or packed BGRA
//! - 8 bytes per pixel: 64-bit packed RGB

use crate::error::DaqError;
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pixel layout derived from byte depth and component count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    /// 1 byte per pixel, one component.
    Gray8,
    /// 2 bytes per pixel, one component.
    Gray16,
    /// 4 bytes per pixel, one component.
    Gray32,
    /// 4 bytes per pixel, four 8-bit components.
    Rgb32,
    /// 8 bytes per pixel, four 16-bit components.
    Rgb64,
    /// Any other combination. Reported, never rejected.
    Unknown,
}

impl PixelType {
    /// Derive the pixel type from bytes per pixel and number of components.
    pub fn from_depth(depth: u32, components: u32) -> Self {
        match (depth, components) {
            (1, _) => PixelType::Gray8,
            (2, _) => PixelType::Gray16,
            (4, 1) => PixelType::Gray32,
            (4, 4) => PixelType::Rgb32,
            (8, _) => PixelType::Rgb64,
            _ => PixelType::Unknown,
        }
    }

    /// Tag value written into frame metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelType::Gray8 => "GRAY8",
            PixelType::Gray16 => "GRAY16",
            PixelType::Gray32 => "GRAY32",
            PixelType::Rgb32 => "RGB32",
            PixelType::Rgb64 => "RGB64",
            PixelType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of a single channel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per pixel (1, 2, 4 or 8).
    pub depth: u32,
}

impl ImageShape {
    /// Create a new shape.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// `width * height * depth` in bytes.
    pub fn footprint(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    /// True if any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

/// One channel of pixel data with exclusively-owned storage.
///
/// Invariant: `pixels.len() >= width * height * depth`. The allocation only
/// grows; shrinking the shape keeps the larger allocation for reuse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImgBuffer {
    width: u32,
    height: u32,
    depth: u32,
    pixels: Vec<u8>,
    metadata: Metadata,
}

impl ImgBuffer {
    /// Allocate a zeroed buffer of the given shape.
    ///
    /// Fails instead of aborting when the allocation cannot be satisfied.
    pub fn new(shape: ImageShape) -> Result<Self, DaqError> {
        Ok(Self {
            width: shape.width,
            height: shape.height,
            depth: shape.depth,
            pixels: zeroed(shape.footprint())?,
            metadata: Metadata::new(),
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Current shape.
    pub fn shape(&self) -> ImageShape {
        ImageShape::new(self.width, self.height, self.depth)
    }

    /// Bytes currently allocated, which may exceed the shape's footprint.
    pub fn allocated_bytes(&self) -> usize {
        self.pixels.len()
    }

    /// Change the shape, reallocating only when the new footprint does not fit.
    ///
    /// All three dimensions change together.
    pub fn resize(&mut self, shape: ImageShape) -> Result<(), DaqError> {
        let needed = shape.footprint();
        if needed > self.pixels.len() {
            self.pixels = zeroed(needed)?;
        }
        self.width = shape.width;
        self.height = shape.height;
        self.depth = shape.depth;
        Ok(())
    }

    /// Copy exactly `width * height * depth` bytes from `src`.
    pub fn set_pixels(&mut self, src: &[u8]) -> Result<(), DaqError> {
        let len = self.shape().footprint();
        if src.len() < len {
            return Err(DaqError::PixelPayloadTooShort {
                expected: len,
                actual: src.len(),
            });
        }
        self.pixels[..len].copy_from_slice(&src[..len]);
        Ok(())
    }

    /// Pixel bytes for the current shape.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels[..self.shape().footprint()]
    }

    /// Per-image metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable per-image metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// The images of all channels acquired at one instant.
///
/// All channels share one shape. Channel buffers must be created with
/// [`ImageFrame::preallocate`] ahead of time; lookups never allocate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageFrame {
    shape: Option<ImageShape>,
    channels: HashMap<u32, ImgBuffer>,
}

impl ImageFrame {
    /// Create an empty frame with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure buffers exist for channels `0..channels`, all sized to `shape`.
    ///
    /// Channels at or above `channels` are dropped.
    pub fn preallocate(&mut self, channels: u32, shape: ImageShape) -> Result<(), DaqError> {
        self.channels.retain(|ch, _| *ch < channels);
        for ch in 0..channels {
            match self.channels.get_mut(&ch) {
                Some(buf) => buf.resize(shape)?,
                None => {
                    self.channels.insert(ch, ImgBuffer::new(shape)?);
                }
            }
        }
        self.shape = Some(shape);
        Ok(())
    }

    /// Look up the buffer of `channel`.
    pub fn find_image(&self, channel: u32) -> Option<&ImgBuffer> {
        self.channels.get(&channel)
    }

    /// Look up the buffer of `channel` for writing.
    pub fn find_image_mut(&mut self, channel: u32) -> Option<&mut ImgBuffer> {
        self.channels.get_mut(&channel)
    }

    /// Remove and return the buffer of `channel`.
    pub fn take_image(&mut self, channel: u32) -> Option<ImgBuffer> {
        self.channels.remove(&channel)
    }

    /// Number of channel buffers held.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Shared shape of all channels, if preallocated.
    pub fn shape(&self) -> Option<ImageShape> {
        self.shape
    }

    /// Channel buffers ordered by channel index.
    pub fn images(&self) -> Vec<(u32, &ImgBuffer)> {
        let mut images: Vec<_> = self.channels.iter().map(|(ch, b)| (*ch, b)).collect();
        images.sort_by_key(|(ch, _)| *ch);
        images
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>, DaqError> {
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(len)
        .map_err(|e| DaqError::BufferAllocation(format!("{len} bytes: {e}")))?;
    pixels.resize(len, 0);
    Ok(pixels)
}
