//! Shared hard limits to prevent unbounded allocations.
//!
//! This module centralizes:
//! - Frame size limits used when sizing the circular buffer
//! - The default memory budget of the circular buffer
//!
//! Using centralized constants ensures the buffer, the registry and the
//! configuration layer agree on the same numbers.

use crate::error::DaqError;

// =============================================================================
// Buffer Limits
// =============================================================================

/// Hard ceiling on the number of frames the circular buffer will preallocate,
/// regardless of how many would fit in the memory budget.
pub const MAX_BUFFER_FRAMES: usize = 100_000;

/// Default memory budget of the circular buffer (250 MB).
pub const DEFAULT_BUFFER_MEMORY_MB: usize = 250;

/// Bytes per megabyte used when converting the memory budget.
pub const BYTES_PER_MB: usize = 1024 * 1024;

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Pixels per channel image.
    pub pixels: usize,
    /// Bytes per channel image.
    pub bytes_per_channel: usize,
    /// Bytes for the whole multi-channel frame.
    pub bytes: usize,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    channels: u32,
) -> Result<FrameSize, DaqError> {
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(DaqError::FrameDimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_FRAME_DIMENSION,
        });
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(DaqError::SizeOverflow {
            context: "frame pixel count",
        })?;

    let bytes_per_channel =
        pixels
            .checked_mul(bytes_per_pixel as usize)
            .ok_or(DaqError::SizeOverflow {
                context: "channel byte size",
            })?;

    let bytes = bytes_per_channel
        .checked_mul(channels as usize)
        .ok_or(DaqError::SizeOverflow {
            context: "frame byte size",
        })?;

    Ok(FrameSize {
        pixels,
        bytes_per_channel,
        bytes,
    })
}

/// Number of frames that fit in `memory_budget_bytes`, clamped to [`MAX_BUFFER_FRAMES`].
///
/// Returns 0 for a zero-sized frame; the buffer is unusable until a real shape is set.
pub fn frames_for_budget(memory_budget_bytes: usize, frame_bytes: usize) -> usize {
    if frame_bytes == 0 {
        return 0;
    }
    (memory_budget_bytes / frame_bytes).min(MAX_BUFFER_FRAMES)
}
