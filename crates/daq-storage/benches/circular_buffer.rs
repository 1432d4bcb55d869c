//! Criterion benchmarks for circular frame buffer hot paths.
//!
//! Key metrics:
//! - Insert+pop throughput for common camera frame sizes
//! - Peek latency
//! - Concurrent producer/consumer throughput
//!
//! Run with: cargo bench --bench circular_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use daq_core::ImageShape;
use daq_storage::CircularFrameBuffer;
use std::sync::Arc;
use std::thread;

/// Insert one frame and pop it again, for several frame sizes.
fn insert_pop_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("circular_buffer_insert_pop");

    let shapes = vec![
        ("256x256x2", ImageShape::new(256, 256, 2)),
        ("512x512x2", ImageShape::new(512, 512, 2)),
        ("1024x1024x2", ImageShape::new(1024, 1024, 2)),
        ("2048x2048x2", ImageShape::new(2048, 2048, 2)),
    ];

    for (name, shape) in shapes {
        let buffer = CircularFrameBuffer::new(64);
        buffer.initialize(1, shape).unwrap();
        let pixels = vec![0u8; shape.footprint()];

        group.throughput(Throughput::Bytes(shape.footprint() as u64));
        group.bench_with_input(BenchmarkId::new("insert_pop", name), &shape, |b, shape| {
            b.iter(|| {
                buffer
                    .insert_image("Camera", black_box(&pixels), *shape, 1, None)
                    .unwrap();
                black_box(buffer.next_image());
            });
        });
    }

    group.finish();
}

/// Peek the newest frame of a partially filled buffer.
fn top_image_latency(c: &mut Criterion) {
    let shape = ImageShape::new(512, 512, 2);
    let buffer = CircularFrameBuffer::new(64);
    buffer.initialize(1, shape).unwrap();
    let pixels = vec![0xAAu8; shape.footprint()];
    for _ in 0..16 {
        buffer.insert_image("Camera", &pixels, shape, 1, None).unwrap();
    }

    c.bench_function("circular_buffer_top_image_buffer", |b| {
        b.iter(|| black_box(buffer.top_image_buffer(0)));
    });
}

/// One producer thread inserting while the benchmark thread drains.
fn concurrent_producer_consumer(c: &mut Criterion) {
    let shape = ImageShape::new(512, 512, 2);
    let frames: usize = 200;

    let mut group = c.benchmark_group("circular_buffer_concurrent");
    group.throughput(Throughput::Bytes((shape.footprint() * frames) as u64));
    group.bench_function("producer_consumer", |b| {
        b.iter(|| {
            let buffer = Arc::new(CircularFrameBuffer::new(64));
            buffer.initialize(1, shape).unwrap();

            let producer = {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let pixels = vec![0u8; shape.footprint()];
                    let mut sent = 0;
                    while sent < frames {
                        if buffer
                            .insert_image("Camera", &pixels, shape, 1, None)
                            .unwrap()
                            .is_inserted()
                        {
                            sent += 1;
                        } else {
                            thread::yield_now();
                        }
                    }
                })
            };

            let mut received = 0;
            while received < frames {
                if buffer.next_image().is_some() {
                    received += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    insert_pop_throughput,
    top_image_latency,
    concurrent_producer_consumer
);
criterion_main!(benches);
