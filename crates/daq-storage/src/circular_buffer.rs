//! Fixed-capacity ring of preallocated multi-channel frames.
//!
//! [`CircularFrameBuffer`] decouples hardware-driven producers (camera callbacks,
//! the acquisition runner) from best-effort consumers (display, disk writers).
//!
//! # Features
//! - Capacity derived once from a memory budget and the per-frame footprint,
//!   clamped to [`MAX_BUFFER_FRAMES`]
//! - Every frame preallocated at initialization; inserts copy into existing storage
//! - Backpressure instead of blocking: a full buffer rejects the insert and raises
//!   a sticky overflow flag
//! - Automatic image tags (size, pixel type, elapsed time, per-source image number)
//!
//! # Counters
//!
//! `insert_index` and `save_index` are `u64` and only ever increase between
//! resets, with `save_index <= insert_index <= save_index + capacity`. A frame
//! lives at slot `index % capacity`. Once `save_index` passes
//! [`REBASE_THRESHOLD`] both counters are lowered by the same multiple of
//! `capacity`, which keeps their difference and both residues mod `capacity`.
//!
//! # Thread Safety
//!
//! - **Inserts**: serialized by `insert_lock`, held for the whole multi-channel copy,
//!   so frames from concurrent producers never interleave.
//! - **Bookkeeping**: counters, shape and the overflow flag sit behind a short
//!   `state` lock that is never held while pixels are copied.
//! - **Consumers**: serialized by `consumer_lock`. A consumer only touches slots in
//!   `[save_index, insert_index)`; the producer only writes slot `insert_index`,
//!   which is outside that range while the buffer is not full.
//! - **Reinitialization**: takes `insert_lock` and the `frames` write lock.
//!   `clear()` and `initialize()` bump an epoch so an in-flight pop that straddles
//!   them is discarded.
//! - No method blocks on hardware or waits for data.

use daq_core::error::DaqError;
use daq_core::image::{ImageFrame, ImageShape, ImgBuffer, PixelType};
use daq_core::limits::{
    frames_for_budget, validate_frame_size, BYTES_PER_MB, DEFAULT_BUFFER_MEMORY_MB,
};
use daq_core::metadata::{tags, Metadata};
use daq_core::InsertOutcome;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::Instant;

pub use daq_core::limits::MAX_BUFFER_FRAMES;

/// `save_index` value past which both counters are rebased.
pub const REBASE_THRESHOLD: u64 = 1 << 48;

/// Bookkeeping guarded by the short lock.
#[derive(Debug)]
struct BufferState {
    insert_index: u64,
    save_index: u64,
    capacity: usize,
    channels: u32,
    shape: Option<ImageShape>,
    overflow: bool,
    memory_budget_mb: usize,
    epoch: u64,
    started: Instant,
    image_numbers: HashMap<String, u64>,
}

impl BufferState {
    fn remaining(&self) -> u64 {
        self.insert_index - self.save_index
    }

    fn is_full(&self) -> bool {
        self.remaining() >= self.capacity as u64
    }

    fn slot(&self, index: u64) -> usize {
        (index % self.capacity as u64) as usize
    }

    fn reset_counters(&mut self) {
        self.insert_index = 0;
        self.save_index = 0;
        self.overflow = false;
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn rebase_if_needed(&mut self) {
        if self.save_index < REBASE_THRESHOLD || self.capacity == 0 {
            return;
        }
        let cap = self.capacity as u64;
        let shift = self.save_index - self.save_index % cap;
        self.save_index -= shift;
        self.insert_index -= shift;
        tracing::trace!(shift, "Rebased circular buffer counters");
    }

    fn check_shape(&self, shape: ImageShape, channels: u32) -> Result<ImageShape, DaqError> {
        let expected = match self.shape {
            Some(s) if self.capacity > 0 => s,
            _ => return Err(DaqError::BufferNotInitialized),
        };
        if expected != shape || self.channels != channels {
            return Err(DaqError::IncompatibleImage {
                width: shape.width,
                height: shape.height,
                depth: shape.depth,
                channels,
                expected_width: expected.width,
                expected_height: expected.height,
                expected_depth: expected.depth,
                expected_channels: self.channels,
            });
        }
        Ok(expected)
    }
}

/// Snapshot of the buffer's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    /// Frames the buffer can hold.
    pub capacity: usize,
    /// Frames waiting to be popped.
    pub remaining: usize,
    /// Free frame slots.
    pub free: usize,
    /// Sticky overflow flag.
    pub overflow: bool,
    /// Configured per-channel shape.
    pub shape: Option<ImageShape>,
    /// Channels per frame.
    pub channels: u32,
}

/// Bounded, thread-safe ring of preallocated [`ImageFrame`]s.
pub struct CircularFrameBuffer {
    insert_lock: Mutex<()>,
    consumer_lock: Mutex<()>,
    state: Mutex<BufferState>,
    frames: RwLock<Vec<Mutex<ImageFrame>>>,
}

impl std::fmt::Debug for CircularFrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircularFrameBuffer")
            .field("capacity", &state.capacity)
            .field("insert_index", &state.insert_index)
            .field("save_index", &state.save_index)
            .field("shape", &state.shape)
            .field("channels", &state.channels)
            .field("overflow", &state.overflow)
            .finish()
    }
}

impl Default for CircularFrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_MEMORY_MB)
    }
}

impl CircularFrameBuffer {
    /// Create an uninitialized buffer with the given memory budget.
    ///
    /// Nothing is allocated until [`initialize`](Self::initialize).
    pub fn new(memory_budget_mb: usize) -> Self {
        Self {
            insert_lock: Mutex::new(()),
            consumer_lock: Mutex::new(()),
            state: Mutex::new(BufferState {
                insert_index: 0,
                save_index: 0,
                capacity: 0,
                channels: 0,
                shape: None,
                overflow: false,
                memory_budget_mb,
                epoch: 0,
                started: Instant::now(),
                image_numbers: HashMap::new(),
            }),
            frames: RwLock::new(Vec::new()),
        }
    }

    /// Memory budget in megabytes.
    pub fn memory_budget_mb(&self) -> usize {
        self.state.lock().memory_budget_mb
    }

    /// Change the memory budget. Takes effect at the next [`initialize`](Self::initialize).
    pub fn set_memory_budget_mb(&self, mb: usize) {
        self.state.lock().memory_budget_mb = mb;
    }

    /// Size the buffer for `channels` images of `shape` and preallocate every frame.
    ///
    /// A no-op when shape, channel count and resulting capacity are unchanged.
    /// Otherwise all frames are reallocated, both counters reset and the overflow
    /// flag cleared. On failure the buffer holds zero frames.
    pub fn initialize(&self, channels: u32, shape: ImageShape) -> Result<(), DaqError> {
        let _insert = self.insert_lock.lock();

        let budget_mb = {
            let state = self.state.lock();
            state.memory_budget_mb
        };
        let capacity = match Self::capacity_for(budget_mb, channels, shape) {
            Ok(capacity) => capacity,
            Err(e) => {
                self.release_frames();
                return Err(e);
            }
        };

        {
            let state = self.state.lock();
            if state.shape == Some(shape)
                && state.channels == channels
                && state.capacity == capacity
            {
                tracing::debug!(capacity, "Circular buffer already initialized for shape");
                return Ok(());
            }
        }

        // Drop the old frames before allocating the new ones.
        self.release_frames();

        let mut frames = Vec::new();
        if let Err(e) = frames.try_reserve_exact(capacity) {
            return Err(DaqError::BufferAllocation(format!(
                "{capacity} frame slots: {e}"
            )));
        }
        for _ in 0..capacity {
            let mut frame = ImageFrame::new();
            frame.preallocate(channels, shape)?;
            frames.push(Mutex::new(frame));
        }

        *self.frames.write() = frames;
        {
            let mut state = self.state.lock();
            state.capacity = capacity;
            state.channels = channels;
            state.shape = Some(shape);
            state.started = Instant::now();
            state.image_numbers.clear();
            state.reset_counters();
        }

        tracing::info!(
            capacity,
            channels,
            width = shape.width,
            height = shape.height,
            depth = shape.depth,
            budget_mb,
            "Circular buffer initialized"
        );
        Ok(())
    }

    fn capacity_for(budget_mb: usize, channels: u32, shape: ImageShape) -> Result<usize, DaqError> {
        if shape.is_empty() || channels == 0 {
            return Err(DaqError::BufferAllocation(format!(
                "zero dimension in {}x{}x{} with {} channels",
                shape.width, shape.height, shape.depth, channels
            )));
        }
        let size = validate_frame_size(shape.width, shape.height, shape.depth, channels)?;
        let budget = budget_mb.checked_mul(BYTES_PER_MB).ok_or(DaqError::SizeOverflow {
            context: "memory budget",
        })?;
        let capacity = frames_for_budget(budget, size.bytes);
        if capacity == 0 {
            return Err(DaqError::BufferAllocation(format!(
                "a {} byte frame does not fit in {} MB",
                size.bytes, budget_mb
            )));
        }
        Ok(capacity)
    }

    fn release_frames(&self) {
        let mut frames = self.frames.write();
        let mut state = self.state.lock();
        frames.clear();
        frames.shrink_to_fit();
        state.capacity = 0;
        state.shape = None;
        state.channels = 0;
        state.reset_counters();
    }

    /// True once [`initialize`](Self::initialize) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().capacity > 0
    }

    /// Frames the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Configured per-channel shape.
    pub fn shape(&self) -> Option<ImageShape> {
        self.state.lock().shape
    }

    /// Channels per frame.
    pub fn channels(&self) -> u32 {
        self.state.lock().channels
    }

    /// Sticky flag set by the first rejected insert since the last reset.
    pub fn overflow(&self) -> bool {
        self.state.lock().overflow
    }

    /// Frames inserted but not yet popped.
    pub fn remaining_image_count(&self) -> usize {
        self.state.lock().remaining() as usize
    }

    /// Free frame slots.
    pub fn free_size(&self) -> usize {
        let state = self.state.lock();
        state.capacity.saturating_sub(state.remaining() as usize)
    }

    /// Consistent snapshot of all counters.
    pub fn status(&self) -> BufferStatus {
        let state = self.state.lock();
        let remaining = state.remaining() as usize;
        BufferStatus {
            capacity: state.capacity,
            remaining,
            free: state.capacity.saturating_sub(remaining),
            overflow: state.overflow,
            shape: state.shape,
            channels: state.channels,
        }
    }

    /// Drop every buffered frame and clear the overflow flag. Allocations are kept.
    pub fn clear(&self) {
        let _insert = self.insert_lock.lock();
        let mut state = self.state.lock();
        state.reset_counters();
        tracing::debug!("Circular buffer cleared");
    }

    /// Insert a single-channel image.
    ///
    /// Returns [`InsertOutcome::Overflow`] without writing when the buffer is full.
    pub fn insert_image(
        &self,
        source: &str,
        pixels: &[u8],
        shape: ImageShape,
        components: u32,
        metadata: Option<&Metadata>,
    ) -> Result<InsertOutcome, DaqError> {
        self.insert_multi_channel(source, pixels, 1, shape, components, metadata)
    }

    /// Insert one frame of `channels` images stored back to back in `pixels`.
    ///
    /// # Errors
    /// - [`DaqError::BufferNotInitialized`] before a successful `initialize`
    /// - [`DaqError::IncompatibleImage`] if shape or channel count differ from the configured ones
    /// - [`DaqError::PixelPayloadTooShort`] if `pixels` holds fewer than `channels` images
    ///
    /// None of these touch the buffer contents.
    pub fn insert_multi_channel(
        &self,
        source: &str,
        pixels: &[u8],
        channels: u32,
        shape: ImageShape,
        components: u32,
        metadata: Option<&Metadata>,
    ) -> Result<InsertOutcome, DaqError> {
        let _insert = self.insert_lock.lock();

        let channel_bytes = shape.footprint();
        let (slot, image_number, elapsed_ms) = {
            let mut state = self.state.lock();
            state.check_shape(shape, channels)?;

            let needed = channel_bytes * channels as usize;
            if pixels.len() < needed {
                return Err(DaqError::PixelPayloadTooShort {
                    expected: needed,
                    actual: pixels.len(),
                });
            }

            if state.is_full() {
                if !state.overflow {
                    tracing::warn!(
                        capacity = state.capacity,
                        source,
                        "Circular buffer full, rejecting frames"
                    );
                }
                state.overflow = true;
                return Ok(InsertOutcome::Overflow);
            }

            let slot = state.slot(state.insert_index);
            let counter = state.image_numbers.entry(source.to_string()).or_insert(0);
            let image_number = *counter;
            *counter += 1;
            let elapsed_ms = state.started.elapsed().as_secs_f64() * 1000.0;
            (slot, image_number, elapsed_ms)
        };

        {
            let frames = self.frames.read();
            let mut frame = frames
                .get(slot)
                .ok_or(DaqError::BufferNotInitialized)?
                .lock();
            let pixel_type = PixelType::from_depth(shape.depth, components);
            for ch in 0..channels {
                let buf = frame
                    .find_image_mut(ch)
                    .ok_or(DaqError::BufferNotInitialized)?;
                let start = ch as usize * channel_bytes;
                buf.set_pixels(&pixels[start..start + channel_bytes])?;
                tag_image(buf, metadata, pixel_type, source, image_number, elapsed_ms, ch);
            }
        }

        let mut state = self.state.lock();
        state.insert_index += 1;
        state.rebase_if_needed();
        Ok(InsertOutcome::Inserted)
    }

    /// Pop the oldest frame. Returns `None` when empty.
    pub fn next_image(&self) -> Option<ImageFrame> {
        let _consumer = self.consumer_lock.lock();

        let (slot, epoch) = {
            let state = self.state.lock();
            if state.remaining() == 0 {
                return None;
            }
            (state.slot(state.save_index), state.epoch)
        };

        let frame = self.frames.read().get(slot)?.lock().clone();

        let mut state = self.state.lock();
        if state.epoch != epoch || state.remaining() == 0 {
            // Cleared or reinitialized while copying
            return None;
        }
        state.save_index += 1;
        state.rebase_if_needed();
        Some(frame)
    }

    /// Pop the oldest frame and return its image for `channel`.
    ///
    /// Returns `None` without popping if the buffer is empty or `channel` does not exist.
    pub fn next_image_buffer(&self, channel: u32) -> Option<ImgBuffer> {
        if channel >= self.channels() {
            return None;
        }
        let mut frame = self.next_image()?;
        frame.take_image(channel)
    }

    /// Most recently inserted frame, without popping it.
    pub fn top_image(&self) -> Option<ImageFrame> {
        self.nth_from_top_image(0)
    }

    /// Image of `channel` in the most recently inserted frame.
    pub fn top_image_buffer(&self, channel: u32) -> Option<ImgBuffer> {
        self.nth_from_top_image_buffer(0, channel)
    }

    /// The `n`-th most recent frame (0 = newest), without popping it.
    pub fn nth_from_top_image(&self, n: usize) -> Option<ImageFrame> {
        let _consumer = self.consumer_lock.lock();

        let slot = {
            let state = self.state.lock();
            if (n as u64) >= state.remaining() {
                return None;
            }
            state.slot(state.insert_index - 1 - n as u64)
        };

        let frame = self.frames.read().get(slot)?.lock().clone();
        Some(frame)
    }

    /// Image of `channel` in the `n`-th most recent frame, without popping it.
    pub fn nth_from_top_image_buffer(&self, n: usize, channel: u32) -> Option<ImgBuffer> {
        let _consumer = self.consumer_lock.lock();

        let slot = {
            let state = self.state.lock();
            if (n as u64) >= state.remaining() {
                return None;
            }
            state.slot(state.insert_index - 1 - n as u64)
        };

        let frames = self.frames.read();
        let frame = frames.get(slot)?.lock();
        let image = frame.find_image(channel).cloned();
        image
    }

    #[cfg(test)]
    fn force_counters(&self, insert_index: u64, save_index: u64) {
        let mut state = self.state.lock();
        state.insert_index = insert_index;
        state.save_index = save_index;
    }

    #[cfg(test)]
    fn counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.insert_index, state.save_index)
    }
}

fn tag_image(
    buf: &mut ImgBuffer,
    metadata: Option<&Metadata>,
    pixel_type: PixelType,
    source: &str,
    image_number: u64,
    elapsed_ms: f64,
    channel: u32,
) {
    let (width, height) = (buf.width(), buf.height());
    let md = buf.metadata_mut();
    md.clear();
    if let Some(extra) = metadata {
        md.merge(extra);
    }
    md.put_single(tags::WIDTH, width);
    md.put_single(tags::HEIGHT, height);
    md.put_single(tags::PIXEL_TYPE, pixel_type);
    if !md.contains(tags::ELAPSED_TIME_MS) {
        md.put_single(tags::ELAPSED_TIME_MS, format!("{elapsed_ms:.3}"));
    }
    md.put(daq_core::MetadataTag::single(tags::IMAGE_NUMBER, image_number).with_device(source));
    md.put_single(tags::CAMERA_CHANNEL_INDEX, channel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHAPE: ImageShape = ImageShape::new(4, 4, 1);

    /// Buffer holding exactly `frames` single-channel 4x4x1 frames.
    fn buffer_with_capacity(frames: usize) -> CircularFrameBuffer {
        // Budget is whole megabytes, so pick a frame size that divides 1 MB.
        let shape = ImageShape::new(1024, 1024 / frames as u32, 1);
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, shape).unwrap();
        assert_eq!(buffer.capacity(), frames);
        buffer
    }

    fn frame_for(buffer: &CircularFrameBuffer, fill: u8) -> Vec<u8> {
        let shape = buffer.shape().unwrap();
        vec![fill; shape.footprint() * buffer.channels() as usize]
    }

    fn insert(buffer: &CircularFrameBuffer, fill: u8) -> InsertOutcome {
        let shape = buffer.shape().unwrap();
        let px = frame_for(buffer, fill);
        buffer
            .insert_multi_channel("Camera", &px, buffer.channels(), shape, 1, None)
            .unwrap()
    }

    #[test]
    fn test_insert_before_initialize_fails_loudly() {
        let buffer = CircularFrameBuffer::new(1);
        let err = buffer
            .insert_image("Camera", &[0; 16], SHAPE, 1, None)
            .unwrap_err();
        assert!(matches!(err, DaqError::BufferNotInitialized));
        assert!(buffer.next_image().is_none());
    }

    #[test]
    fn test_initialize_rejects_zero_dimension() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, SHAPE).unwrap();
        assert!(buffer.initialize(1, ImageShape::new(0, 4, 1)).is_err());
        assert_eq!(buffer.capacity(), 0);
        assert!(!buffer.is_initialized());
    }

    #[test]
    fn test_initialize_rejects_frame_larger_than_budget() {
        let buffer = CircularFrameBuffer::new(1);
        let err = buffer
            .initialize(2, ImageShape::new(1024, 1024, 1))
            .unwrap_err();
        assert!(matches!(err, DaqError::BufferAllocation(_)));
        assert!(!buffer.is_initialized());
    }

    #[test]
    fn test_capacity_clamped_to_ceiling() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, ImageShape::new(1, 1, 1)).unwrap();
        assert_eq!(buffer.capacity(), MAX_BUFFER_FRAMES);
    }

    #[test]
    fn test_initialize_same_shape_is_noop() {
        let buffer = buffer_with_capacity(8);
        let shape = buffer.shape().unwrap();
        insert(&buffer, 1);
        buffer.initialize(1, shape).unwrap();
        assert_eq!(buffer.remaining_image_count(), 1);
    }

    #[test]
    fn test_reinitialize_new_shape_resets() {
        let buffer = buffer_with_capacity(8);
        insert(&buffer, 1);
        buffer.initialize(1, ImageShape::new(1024, 256, 1)).unwrap();
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.remaining_image_count(), 0);
        assert!(!buffer.overflow());
    }

    #[test]
    fn test_budget_change_applies_on_next_initialize() {
        let buffer = buffer_with_capacity(8);
        let shape = buffer.shape().unwrap();
        buffer.set_memory_budget_mb(2);
        assert_eq!(buffer.capacity(), 8);
        buffer.initialize(1, shape).unwrap();
        assert_eq!(buffer.capacity(), 16);
    }

    #[test]
    fn test_inserts_up_to_capacity() {
        let buffer = buffer_with_capacity(8);
        for n in 1..=8 {
            assert_eq!(insert(&buffer, n as u8), InsertOutcome::Inserted);
            assert_eq!(buffer.remaining_image_count(), n);
            assert!(!buffer.overflow());
        }
        assert_eq!(buffer.free_size(), 0);
    }

    #[test]
    fn test_overflow_on_capacity_plus_one() {
        let buffer = buffer_with_capacity(4);
        for i in 0..4 {
            assert_eq!(insert(&buffer, i), InsertOutcome::Inserted);
        }
        assert_eq!(insert(&buffer, 99), InsertOutcome::Overflow);
        assert!(buffer.overflow());
        assert_eq!(buffer.remaining_image_count(), 4);
        assert_eq!(
            buffer.status(),
            BufferStatus {
                capacity: 4,
                remaining: 4,
                free: 0,
                overflow: true,
                shape: Some(ImageShape::new(1024, 256, 1)),
                channels: 1,
            }
        );

        // Oldest frame untouched by the rejected insert
        let first = buffer.next_image_buffer(0).unwrap();
        assert!(first.pixels().iter().all(|&b| b == 0));

        // Sticky until cleared, even after space frees up
        assert_eq!(insert(&buffer, 5), InsertOutcome::Inserted);
        assert!(buffer.overflow());
        buffer.clear();
        assert!(!buffer.overflow());
    }

    #[test]
    fn test_round_trip_bytes() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, SHAPE).unwrap();
        let px: Vec<u8> = (0..16).collect();
        buffer.insert_image("Camera", &px, SHAPE, 1, None).unwrap();

        let frame = buffer.next_image().unwrap();
        assert_eq!(frame.find_image(0).unwrap().pixels(), px.as_slice());
        assert!(buffer.next_image().is_none());
    }

    #[test]
    fn test_clear_on_empty_is_idempotent() {
        let buffer = buffer_with_capacity(4);
        for _ in 0..2 {
            assert_eq!(buffer.remaining_image_count(), 0);
            assert!(!buffer.overflow());
            buffer.clear();
        }
        assert_eq!(buffer.remaining_image_count(), 0);
        assert!(!buffer.overflow());
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn test_peek_then_pop_same_frame() {
        let buffer = buffer_with_capacity(4);
        insert(&buffer, 7);
        let peeked = buffer.top_image_buffer(0).unwrap();
        let popped = buffer.next_image_buffer(0).unwrap();
        assert_eq!(peeked.pixels(), popped.pixels());
        assert_eq!(peeked.metadata(), popped.metadata());
    }

    #[test]
    fn test_nth_from_top() {
        let buffer = buffer_with_capacity(4);
        for fill in [1, 2, 3] {
            insert(&buffer, fill);
        }
        assert_eq!(buffer.nth_from_top_image_buffer(0, 0).unwrap().pixels()[0], 3);
        assert_eq!(buffer.nth_from_top_image_buffer(2, 0).unwrap().pixels()[0], 1);
        assert!(buffer.nth_from_top_image_buffer(3, 0).is_none());
        assert!(buffer.nth_from_top_image_buffer(0, 1).is_none());
        // Peeking never consumes
        assert_eq!(buffer.remaining_image_count(), 3);
    }

    #[test]
    fn test_fifo_across_wrap() {
        let buffer = buffer_with_capacity(4);
        for round in 0..3u8 {
            for i in 0..4u8 {
                insert(&buffer, round * 10 + i);
            }
            for i in 0..4u8 {
                let buf = buffer.next_image_buffer(0).unwrap();
                assert_eq!(buf.pixels()[0], round * 10 + i);
            }
        }
    }

    #[test]
    fn test_shape_mismatch_rejected_atomically() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, SHAPE).unwrap();
        buffer.insert_image("Camera", &[1; 16], SHAPE, 1, None).unwrap();

        let err = buffer
            .insert_image("Camera", &[2; 32], ImageShape::new(4, 4, 2), 1, None)
            .unwrap_err();
        assert!(matches!(err, DaqError::IncompatibleImage { .. }));

        let err = buffer
            .insert_multi_channel("Camera", &[2; 32], 2, SHAPE, 1, None)
            .unwrap_err();
        assert!(matches!(err, DaqError::IncompatibleImage { .. }));

        assert_eq!(buffer.remaining_image_count(), 1);
        assert_eq!(buffer.next_image_buffer(0).unwrap().pixels(), &[1; 16]);
    }

    #[test]
    fn test_short_payload_rejected() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, SHAPE).unwrap();
        let err = buffer
            .insert_image("Camera", &[0; 8], SHAPE, 1, None)
            .unwrap_err();
        assert!(matches!(err, DaqError::PixelPayloadTooShort { .. }));
        assert_eq!(buffer.remaining_image_count(), 0);
    }

    #[test]
    fn test_multi_channel_split_and_tags() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(2, SHAPE).unwrap();
        let mut px = vec![1u8; 16];
        px.extend(vec![2u8; 16]);

        let mut md = Metadata::new();
        md.put_single("Channel", "DAPI");
        buffer
            .insert_multi_channel("Camera", &px, 2, SHAPE, 1, Some(&md))
            .unwrap();

        let frame = buffer.next_image().unwrap();
        let ch0 = frame.find_image(0).unwrap();
        let ch1 = frame.find_image(1).unwrap();
        assert!(ch0.pixels().iter().all(|&b| b == 1));
        assert!(ch1.pixels().iter().all(|&b| b == 2));

        let tags0 = ch0.metadata();
        assert_eq!(tags0.get_str("Width"), Some("4"));
        assert_eq!(tags0.get_str("Height"), Some("4"));
        assert_eq!(tags0.get_str("PixelType"), Some("GRAY8"));
        assert_eq!(tags0.get_str("Channel"), Some("DAPI"));
        assert_eq!(tags0.get_str("Camera-ImageNumber"), Some("0"));
        assert!(tags0.contains("ElapsedTime-ms"));
        assert_eq!(tags0.get_str("CameraChannelIndex"), Some("0"));
        assert_eq!(ch1.metadata().get_str("CameraChannelIndex"), Some("1"));
    }

    #[test]
    fn test_caller_elapsed_time_kept() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, SHAPE).unwrap();
        let mut md = Metadata::new();
        md.put_single("ElapsedTime-ms", "42.0");
        buffer
            .insert_image("Camera", &[0; 16], SHAPE, 1, Some(&md))
            .unwrap();
        let buf = buffer.next_image_buffer(0).unwrap();
        assert_eq!(buf.metadata().get_str("ElapsedTime-ms"), Some("42.0"));
    }

    #[test]
    fn test_image_numbers_per_source() {
        let buffer = CircularFrameBuffer::new(1);
        buffer.initialize(1, SHAPE).unwrap();
        for source in ["A", "B", "A", "A"] {
            buffer.insert_image(source, &[0; 16], SHAPE, 1, None).unwrap();
        }
        let numbers: Vec<String> = (0..4)
            .map(|_| {
                let buf = buffer.next_image_buffer(0).unwrap();
                let md = buf.metadata();
                md.get_str("A-ImageNumber")
                    .or_else(|| md.get_str("B-ImageNumber"))
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(numbers, vec!["0", "0", "1", "2"]);
    }

    #[test]
    fn test_rgb_pixel_type_tag() {
        let buffer = CircularFrameBuffer::new(1);
        let shape = ImageShape::new(2, 2, 4);
        buffer.initialize(1, shape).unwrap();
        buffer.insert_image("Camera", &[0; 16], shape, 4, None).unwrap();
        let buf = buffer.next_image_buffer(0).unwrap();
        assert_eq!(buf.metadata().get_str("PixelType"), Some("RGB32"));
    }

    #[test]
    fn test_counter_rebase_preserves_order() {
        let buffer = buffer_with_capacity(4);
        // Park both counters just below the threshold at slot 3.
        let start = REBASE_THRESHOLD - 1;
        buffer.force_counters(start, start);

        for i in 0..3u8 {
            insert(&buffer, i);
        }
        for i in 0..3u8 {
            assert_eq!(buffer.next_image_buffer(0).unwrap().pixels()[0], i);
        }
        let (insert_index, save_index) = buffer.counters();
        assert!(save_index < REBASE_THRESHOLD);
        assert_eq!(insert_index, save_index);
        assert_eq!(save_index % 4, (start + 3) % 4);
    }

    #[test]
    fn test_concurrent_producers_never_interleave() {
        let buffer = Arc::new(CircularFrameBuffer::new(1));
        let shape = ImageShape::new(64, 64, 1);
        buffer.initialize(2, shape).unwrap();

        let producers: Vec<_> = (0..4u8)
            .map(|id| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let px = vec![id; shape.footprint() * 2];
                    for _ in 0..25 {
                        buffer
                            .insert_multi_channel(&format!("P{id}"), &px, 2, shape, 1, None)
                            .unwrap();
                    }
                })
            })
            .collect();

        let mut seen = 0;
        while seen < 100 {
            match buffer.next_image() {
                Some(frame) => {
                    let a = frame.find_image(0).unwrap().pixels();
                    let b = frame.find_image(1).unwrap().pixels();
                    let id = a[0];
                    assert!(a.iter().all(|&v| v == id));
                    assert!(b.iter().all(|&v| v == id));
                    seen += 1;
                }
                None => thread::yield_now(),
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(buffer.remaining_image_count(), 0);
        assert!(!buffer.overflow());
    }
}
