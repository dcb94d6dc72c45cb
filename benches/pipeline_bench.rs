//! Liu 流式解码管线性能基准测试.
//!
//! 覆盖帧同步码搜索、单帧解码与整条流的逐步解码.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use liu::codec::{DecodeContext, FrameDecoder, NativeFrameDecoder, StreamParameters};
use liu::core::crc;
use liu::format::MemorySource;
use liu::{DecodePipeline, StepOutcome};

const BLOCK: usize = 4096;

struct BitWriter {
    bytes: Vec<u8>,
    acc: u8,
    count: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            acc: 0,
            count: 0,
        }
    }

    fn put(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u8;
            self.count += 1;
            if self.count == 8 {
                self.bytes.push(self.acc);
                self.acc = 0;
                self.count = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            self.bytes.push(self.acc << (8 - self.count));
        }
        self.bytes
    }
}

/// 44100 Hz 立体声 16 位, mid-side 编码的 Verbatim 帧
fn make_frame(seed: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put(0b11111111111110, 14);
    w.put(0, 2);
    w.put(7, 4);
    w.put(9, 4);
    w.put(10, 4);
    w.put(4, 3);
    w.put(0, 1);
    w.put(0, 8);
    w.put(BLOCK as u32 - 1, 16);
    let mut frame = w.finish();
    frame.push(crc::crc8(&frame));

    let mut w = BitWriter::new();
    w.put(0b0000_0010, 8);
    for i in 0..BLOCK as u32 {
        w.put((i.wrapping_mul(7) + seed) & 0x0FFF, 16);
    }
    w.put(0b0000_0010, 8);
    for i in 0..BLOCK as u32 {
        w.put((i % 64) & 0x1FFFF, 17);
    }
    frame.extend_from_slice(&w.finish());
    let frame_crc = crc::crc16(&frame);
    frame.extend_from_slice(&frame_crc.to_be_bytes());
    frame
}

/// `fLaC` + STREAMINFO + 指定数量的帧
fn make_stream(frames: u32) -> Vec<u8> {
    let mut data = b"fLaC".to_vec();
    data.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    data.extend_from_slice(&(BLOCK as u16).to_be_bytes());
    data.extend_from_slice(&(BLOCK as u16).to_be_bytes());
    data.extend_from_slice(&[0u8; 6]);
    let total = u64::from(frames) * BLOCK as u64;
    let packed = (44100u64 << 44) | (1u64 << 41) | (15u64 << 36) | total;
    data.extend_from_slice(&packed.to_be_bytes());
    data.extend_from_slice(&[0u8; 16]);
    for seed in 0..frames {
        data.extend(make_frame(seed));
    }
    data
}

fn stream_params() -> StreamParameters {
    StreamParameters {
        min_block_size: BLOCK as u16,
        max_block_size: BLOCK as u16,
        min_frame_size: 0,
        max_frame_size: 0,
        sample_rate: 44100,
        channels: 2,
        bits_per_sample: 16,
        total_samples: 0,
    }
}

fn bench_locate_frame(c: &mut Criterion) {
    c.bench_function("flac_locate_frame_64k_noise", |b| {
        let mut data: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
        data.extend(make_frame(0));
        let ctx = DecodeContext::new(stream_params()).unwrap();
        let decoder = NativeFrameDecoder::new();
        b.iter(|| decoder.locate_frame(black_box(&data), &ctx));
    });
}

fn bench_decode_frame(c: &mut Criterion) {
    c.bench_function("flac_decode_frame_4096_stereo", |b| {
        let frame = make_frame(1);
        let params = stream_params();
        let mut ctx = DecodeContext::new(params).unwrap();
        let mut decoder = NativeFrameDecoder::new();
        let mut output = vec![0u8; params.output_block_bytes()];
        b.iter(|| {
            decoder
                .decode_frame(&mut ctx, black_box(&frame), &mut output)
                .unwrap()
        });
    });
}

fn bench_pipeline(c: &mut Criterion) {
    c.bench_function("pipeline_decode_32_frames", |b| {
        let data = make_stream(32);
        b.iter(|| {
            let source = MemorySource::from_data(data.clone());
            let mut pipeline = DecodePipeline::open(source).unwrap();
            let mut samples = 0u64;
            loop {
                match pipeline.step() {
                    StepOutcome::Produced(block) => samples += u64::from(block.frame_count),
                    StepOutcome::NoDataRetry => {}
                    StepOutcome::Done => break,
                    StepOutcome::Fatal(err) => panic!("{}", err),
                }
            }
            black_box(samples)
        });
    });
}

criterion_group!(benches, bench_locate_frame, bench_decode_frame, bench_pipeline);
criterion_main!(benches);
