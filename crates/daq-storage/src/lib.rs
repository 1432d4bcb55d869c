//! Frame buffering between hardware producers and display/disk consumers.

pub mod circular_buffer;

pub use circular_buffer::{BufferStatus, CircularFrameBuffer};
