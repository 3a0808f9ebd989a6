//! Performance benchmarks for LinkCodec.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bioscan_core::{CaptureKind, FrameShape, SlotIndex};
use bioscan_protocol::{Command, DeviceEvent, FrameImage, LinkCodec};
use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

type ClientCodec = LinkCodec<Command, DeviceEvent>;
type DeviceCodec = LinkCodec<DeviceEvent, Command>;

fn preview_frame(side: u32) -> DeviceEvent {
    DeviceEvent::Streaming {
        image: FrameImage::new(side, side, vec![0x7fu8; (side * side) as usize]),
    }
}

fn encoded(event: DeviceEvent) -> BytesMut {
    let mut buffer = BytesMut::new();
    DeviceCodec::new().encode(event, &mut buffer).unwrap();
    buffer
}

/// Encoding a small command, the common client-side case.
fn bench_encode_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_command");
    group.throughput(Throughput::Elements(1));

    let command = Command::StartFpCapture {
        kind: CaptureKind::FourFinger,
        slot: SlotIndex::new(0),
    };

    group.bench_function("start_fp_capture", |b| {
        b.iter(|| {
            let mut codec = ClientCodec::new();
            let mut buffer = BytesMut::new();
            codec.encode(black_box(command.clone()), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    group.finish();
}

/// Decoding preview frames of increasing size.
fn bench_decode_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frames");

    for side in [32u32, 128, 256] {
        let wire = encoded(preview_frame(side));
        group.throughput(Throughput::Bytes(wire.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(side), &wire, |b, wire| {
            b.iter(|| {
                let mut codec = ClientCodec::new();
                let mut buffer = wire.clone();
                black_box(codec.decode(&mut buffer).unwrap());
            });
        });
    }

    group.finish();
}

/// Decoding a last frame delivered in small chunks.
fn bench_decode_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_chunked");

    let wire = encoded(DeviceEvent::LastFrame {
        shape: FrameShape::Rolled,
        image: FrameImage::new(64, 64, vec![0u8; 64 * 64]),
        raw: None,
        saved_at: SlotIndex::new(1),
    });

    for chunk_size in [64usize, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("chunk_{chunk_size}_bytes")),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut codec = ClientCodec::new();
                    let mut buffer = BytesMut::new();
                    let mut decoded = None;
                    for piece in wire.chunks(chunk_size) {
                        buffer.extend_from_slice(piece);
                        if let Some(event) = codec.decode(&mut buffer).unwrap() {
                            decoded = Some(event);
                        }
                    }
                    black_box(decoded);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_command,
    bench_decode_frames,
    bench_decode_chunked
);
criterion_main!(benches);
