//! Buffer consumer thread.
//!
//! [`FrameDrain`] pops frames from a [`CircularFrameBuffer`] as they arrive.
//! The buffer never blocks a reader, so an empty buffer is polled again after
//! an exponential backoff that resets as soon as a frame shows up.

use daq_core::ImageFrame;
use daq_storage::CircularFrameBuffer;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// Polling backoff of a [`FrameDrain`].
#[derive(Debug, Clone, Copy)]
pub struct DrainConfig {
    /// First sleep after the buffer is found empty
    pub min_backoff: Duration,
    /// Upper bound of the doubling backoff
    pub max_backoff: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(50),
        }
    }
}

/// Totals of a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Frames popped
    pub frames: u64,
    /// Pixel bytes popped, all channels
    pub bytes: u64,
}

impl fmt::Display for DrainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frames drained ({} bytes)", self.frames, self.bytes)
    }
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    bytes: AtomicU64,
}

/// Consumer thread popping every frame of a buffer.
pub struct FrameDrain {
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl FrameDrain {
    /// Start a drain that only counts frames.
    pub fn spawn(buffer: Arc<CircularFrameBuffer>, config: DrainConfig) -> io::Result<Self> {
        Self::spawn_with(buffer, config, |_| {})
    }

    /// Start a drain that hands every frame to `sink`, oldest first.
    pub fn spawn_with<F>(
        buffer: Arc<CircularFrameBuffer>,
        config: DrainConfig,
        mut sink: F,
    ) -> io::Result<Self>
    where
        F: FnMut(ImageFrame) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let thread_stop = Arc::clone(&stop);
        let thread_counters = Arc::clone(&counters);
        let handle = std::thread::Builder::new()
            .name("frame-drain".into())
            .spawn(move || {
                let mut backoff = config.min_backoff;
                loop {
                    // Read the flag before polling so frames inserted ahead of
                    // stop() are still drained.
                    let stopping = thread_stop.load(Ordering::Acquire);
                    match buffer.next_image() {
                        Some(frame) => {
                            let bytes: usize =
                                frame.images().iter().map(|(_, img)| img.pixels().len()).sum();
                            thread_counters.frames.fetch_add(1, Ordering::Relaxed);
                            thread_counters
                                .bytes
                                .fetch_add(bytes as u64, Ordering::Relaxed);
                            sink(frame);
                            backoff = config.min_backoff;
                        }
                        None if stopping => break,
                        None => {
                            std::thread::sleep(backoff);
                            backoff = (backoff * 2).min(config.max_backoff);
                        }
                    }
                }
                debug!("Frame drain exiting");
            })?;

        Ok(Self {
            stop,
            counters,
            handle: Some(handle),
        })
    }

    /// Frames popped so far.
    pub fn frames(&self) -> u64 {
        self.counters.frames.load(Ordering::Relaxed)
    }

    /// Pixel bytes popped so far.
    pub fn bytes(&self) -> u64 {
        self.counters.bytes.load(Ordering::Relaxed)
    }

    /// Drain what is left in the buffer, stop the thread and return the totals.
    pub fn stop(mut self) -> DrainSummary {
        self.shutdown();
        let summary = DrainSummary {
            frames: self.frames(),
            bytes: self.bytes(),
        };
        info!(frames = summary.frames, bytes = summary.bytes, "Frame drain stopped");
        summary
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Frame drain thread panicked");
            }
        }
    }
}

impl Drop for FrameDrain {
    fn drop(&mut self) {
        self.shutdown();
    }
}
