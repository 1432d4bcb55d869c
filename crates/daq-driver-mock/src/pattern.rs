//! Test pattern generation for mock camera frames.

use daq_core::ImageShape;

/// Simple pseudo-random number generator (LCG) for reproducible noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Generates one channel of a diagnostic test pattern as raw bytes.
///
/// The pattern is a diagonal gradient with a bright crosshair through the
/// center, a per-channel intensity offset and a little frame-dependent noise,
/// so consecutive frames differ while staying recognizable.
///
/// Samples are written little-endian at `shape.depth` bytes per pixel; for
/// depths of 4 and 8 the gradient is written into every component.
pub fn generate_test_pattern(shape: ImageShape, frame_num: u64, channel: u32) -> Vec<u8> {
    let w = shape.width as usize;
    let h = shape.height as usize;
    let depth = shape.depth as usize;
    let mut out = Vec::with_capacity(shape.footprint());

    let (cx, cy) = (w / 2, h / 2);
    let frame_seed = frame_num.wrapping_mul(2654435761);
    let channel_offset = f64::from(channel) * 0.1;

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let gradient = (x + y) as f64 / (w + h).max(1) as f64;
            let noise = (prng(frame_seed ^ idx as u64) & 0xFF) as f64 / 255.0 * 0.02;
            let on_crosshair = x == cx || y == cy;
            let level = if on_crosshair {
                1.0
            } else {
                (gradient * 0.8 + channel_offset + noise).min(1.0)
            };
            push_sample(&mut out, level, depth);
        }
    }

    out
}

fn push_sample(out: &mut Vec<u8>, level: f64, depth: usize) {
    match depth {
        1 => out.push((level * 255.0) as u8),
        2 => out.extend_from_slice(&((level * 65535.0) as u16).to_le_bytes()),
        4 => {
            let v = (level * 255.0) as u8;
            out.extend_from_slice(&[v, v, v, 255]);
        }
        8 => {
            let v = ((level * 65535.0) as u16).to_le_bytes();
            for _ in 0..3 {
                out.extend_from_slice(&v);
            }
            out.extend_from_slice(&u16::MAX.to_le_bytes());
        }
        _ => out.extend(std::iter::repeat((level * 255.0) as u8).take(depth)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_generates_correct_size() {
        for depth in [1, 2, 3, 4, 8] {
            let shape = ImageShape::new(64, 48, depth);
            assert_eq!(generate_test_pattern(shape, 0, 0).len(), shape.footprint());
        }
    }

    #[test]
    fn test_pattern_varies_with_frame_and_channel() {
        let shape = ImageShape::new(32, 32, 2);
        let a = generate_test_pattern(shape, 0, 0);
        assert_ne!(a, generate_test_pattern(shape, 1, 0));
        assert_ne!(a, generate_test_pattern(shape, 0, 1));
        assert_eq!(a, generate_test_pattern(shape, 0, 0));
    }

    #[test]
    fn test_crosshair_is_saturated() {
        let shape = ImageShape::new(9, 9, 1);
        let px = generate_test_pattern(shape, 3, 0);
        assert_eq!(px[4 * 9 + 4], 255);
    }
}
