//! 纯 Rust FLAC 帧解码器.
//!
//! 实现 [`FrameDecoder`] 契约, 支持:
//! - 帧头解析与 CRC-8 校验, 帧尾 CRC-16 校验
//! - 子帧解码: Constant, Verbatim, Fixed (0-4 阶), LPC
//! - 立体声 decorrelation (left-side, right-side, mid-side)
//!
//! # 输出格式
//! 交错小端 PCM, 始终双声道:
//! - 位深 <= 16: 16 位容器, 采样左对齐 (8 位采样左移 8 位)
//! - 位深 > 16: 32 位容器, 保留原始数值
//! - 单声道流复制到左右两个声道
//!
//! # 帧结构
//! ```text
//! Frame header (见 header.rs)
//! Subframe 0..N:
//!   Header:      1 bit (padding) + 6 bits (type) + 1 bit (wasted bits flag)
//!   Data:        varies by type
//! Padding:       align to byte boundary
//! CRC-16:        16 bits
//! ```

mod header;
mod subframe;

use liu_core::{BitReader, LiuError, LiuResult, crc};
use log::trace;

use crate::context::{DecodeContext, Decorrelation};
use crate::decoder::{DecodedFrame, FrameDecoder};
use crate::params::StreamParameters;

use self::header::{find_sync_code, parse_frame_header};
use self::subframe::decode_subframe;

/// 纯 Rust FLAC 帧解码器
///
/// 自身不持有任何逐流状态, 采样累积区在 [`DecodeContext`] 中.
#[derive(Debug, Default)]
pub struct NativeFrameDecoder;

impl NativeFrameDecoder {
    /// 创建解码器
    pub fn new() -> Self {
        Self
    }

    fn decode(
        &self,
        ctx: &mut DecodeContext,
        data: &[u8],
        output: &mut [u8],
    ) -> LiuResult<DecodedFrame> {
        let params = *ctx.params();
        let mut br = BitReader::new(data);
        let header = parse_frame_header(&mut br, data, &params)?;

        if header.assignment.channels() != params.channels {
            return Err(LiuError::InvalidData(format!(
                "帧声道数 {} 与流声道数 {} 不一致",
                header.assignment.channels(),
                params.channels,
            )));
        }
        if header.block_size > u32::from(params.max_block_size) {
            return Err(LiuError::InvalidData(format!(
                "帧块大小 {} 超过流最大块大小 {}",
                header.block_size, params.max_block_size,
            )));
        }
        if header.bits_per_sample != params.bits_per_sample {
            return Err(LiuError::InvalidData(format!(
                "帧位深 {} 与流位深 {} 不一致",
                header.bits_per_sample, params.bits_per_sample,
            )));
        }

        let block = header.block_size as usize;
        let required = block * params.output_channels() as usize * params.bytes_per_sample();
        if output.len() < required {
            return Err(LiuError::InvalidArgument(format!(
                "输出缓冲区不足: 需要 {} 字节, 只有 {} 字节",
                required,
                output.len(),
            )));
        }

        let bps = header.bits_per_sample;
        let (channel0, channel1) = ctx.channels_mut();
        let left = &mut channel0[..block];
        decode_subframe(&mut br, left, header.assignment.subframe_bps(0, bps))?;
        if params.channels == 2 {
            let right = &mut channel1[..block];
            decode_subframe(&mut br, right, header.assignment.subframe_bps(1, bps))?;
            decorrelate(header.assignment.decorrelation(), left, right);
        }

        br.align_to_byte();
        let frame_end = br.byte_position();
        let crc_read = br.read_bits(16)? as u16;
        let crc_calc = crc::crc16(&data[..frame_end]);
        if crc_read != crc_calc {
            return Err(LiuError::InvalidData(format!(
                "FLAC 帧 CRC-16 不匹配: 读取=0x{:04X}, 计算=0x{:04X}",
                crc_read, crc_calc,
            )));
        }

        let (channel0, channel1) = ctx.channels_mut();
        let right: &[i32] = if params.channels == 2 {
            &channel1[..block]
        } else {
            &channel0[..block]
        };
        write_interleaved(&mut output[..required], &channel0[..block], right, &params);

        let frame_size = frame_end + 2;
        ctx.block_size = header.block_size;
        ctx.frame_size = frame_size;
        ctx.decorrelation = header.assignment.decorrelation();

        trace!(
            "FLAC 帧: block_size={}, frame_size={}, sample_rate={}, {:?}",
            header.block_size, frame_size, header.sample_rate, header.assignment,
        );

        Ok(DecodedFrame {
            block_size: header.block_size,
            frame_size,
            pcm_bytes: required,
        })
    }
}

impl FrameDecoder for NativeFrameDecoder {
    fn name(&self) -> &str {
        "flac"
    }

    fn locate_frame(&self, data: &[u8], _ctx: &DecodeContext) -> Option<usize> {
        find_sync_code(data)
    }

    fn decode_frame(
        &mut self,
        ctx: &mut DecodeContext,
        data: &[u8],
        output: &mut [u8],
    ) -> LiuResult<DecodedFrame> {
        // 失败时不提供跳过提示, 由管线逐字节重新同步
        ctx.frame_size = 0;
        match self.decode(ctx, data, output) {
            Err(LiuError::Eof) => Err(LiuError::NeedMoreData),
            other => other,
        }
    }
}

/// 还原立体声去相关
fn decorrelate(mode: Decorrelation, ch0: &mut [i32], ch1: &mut [i32]) {
    match mode {
        Decorrelation::Independent => {}
        Decorrelation::LeftSide => {
            // ch0 = left, ch1 = side -> ch1 = left - side
            for (l, r) in ch0.iter().zip(ch1.iter_mut()) {
                *r = l.wrapping_sub(*r);
            }
        }
        Decorrelation::RightSide => {
            // ch0 = side, ch1 = right -> ch0 = side + right
            for (l, r) in ch0.iter_mut().zip(ch1.iter()) {
                *l = l.wrapping_add(*r);
            }
        }
        Decorrelation::MidSide => {
            for (mid_val, side_val) in ch0.iter_mut().zip(ch1.iter_mut()) {
                let side = *side_val;
                let mid = mid_val.wrapping_shl(1) | (side & 1);
                *mid_val = mid.wrapping_add(side) >> 1;
                *side_val = mid.wrapping_sub(side) >> 1;
            }
        }
    }
}

/// 写出交错双声道 PCM
fn write_interleaved(output: &mut [u8], left: &[i32], right: &[i32], params: &StreamParameters) {
    let samples = left.iter().zip(right.iter());
    if params.bytes_per_sample() == 2 {
        let shift = 16 - params.bits_per_sample;
        for (frame, (&l, &r)) in output.chunks_exact_mut(4).zip(samples) {
            frame[..2].copy_from_slice(&((l << shift) as i16).to_le_bytes());
            frame[2..].copy_from_slice(&((r << shift) as i16).to_le_bytes());
        }
    } else {
        for (frame, (&l, &r)) in output.chunks_exact_mut(8).zip(samples) {
            frame[..4].copy_from_slice(&l.to_le_bytes());
            frame[4..].copy_from_slice(&r.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;

    /// 测试用比特写入器
    #[derive(Default)]
    struct BitWriter {
        bytes: Vec<u8>,
        acc: u8,
        count: u32,
    }

    impl BitWriter {
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

    /// 构建一个 Verbatim 子帧组成的帧 (44100 Hz, 块大小用 8 位显式编码)
    fn verbatim_frame(ch_code: u32, bps: u32, channels: &[&[i32]]) -> Vec<u8> {
        let block = channels[0].len() as u32;
        let ss_code = match bps {
            8 => 1,
            12 => 2,
            16 => 4,
            24 => 6,
            _ => 0,
        };

        let mut w = BitWriter::default();
        w.put(0b11111111111110, 14);
        w.put(0, 2);
        w.put(6, 4);
        w.put(9, 4);
        w.put(ch_code, 4);
        w.put(ss_code, 3);
        w.put(0, 1);
        w.put(0, 8);
        w.put(block - 1, 8);
        let mut frame = w.finish();
        frame.push(crc::crc8(&frame));

        let assignment = match ch_code {
            8 => header::ChannelAssignment::LeftSide,
            9 => header::ChannelAssignment::RightSide,
            10 => header::ChannelAssignment::MidSide,
            n => header::ChannelAssignment::Independent(n + 1),
        };
        let mut w = BitWriter::default();
        for (ch, samples) in channels.iter().enumerate() {
            let sub_bps = assignment.subframe_bps(ch as u32, bps);
            w.put(0b0000_0010, 8);
            for &s in samples.iter() {
                w.put(s as u32 & ((1u64 << sub_bps) - 1) as u32, sub_bps);
            }
        }
        frame.extend_from_slice(&w.finish());

        let frame_crc = crc::crc16(&frame);
        frame.extend_from_slice(&frame_crc.to_be_bytes());
        frame
    }

    fn decode_one(
        channels: u32,
        bps: u32,
        frame: &[u8],
    ) -> (LiuResult<DecodedFrame>, DecodeContext, Vec<u8>) {
        let params = test_params(channels, bps, 16);
        let mut ctx = DecodeContext::new(params).unwrap();
        let mut output = vec![0u8; params.output_block_bytes()];
        let mut decoder = NativeFrameDecoder::new();
        let result = decoder.decode_frame(&mut ctx, frame, &mut output);
        (result, ctx, output)
    }

    fn pcm16(output: &[u8]) -> Vec<i16> {
        output
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_解码独立立体声帧() {
        let frame = verbatim_frame(1, 16, &[&[1, -2, 300, 4], &[-5, 6, 7, -32768]]);
        let (result, ctx, output) = decode_one(2, 16, &frame);
        let decoded = result.unwrap();

        assert_eq!(decoded.block_size, 4);
        assert_eq!(decoded.frame_size, frame.len());
        assert_eq!(decoded.pcm_bytes, 4 * 2 * 2);
        assert_eq!(ctx.frame_size, frame.len());
        assert_eq!(ctx.block_size, 4);
        assert_eq!(
            pcm16(&output[..decoded.pcm_bytes]),
            vec![1, -5, -2, 6, 300, 7, 4, -32768],
        );
    }

    #[test]
    fn test_单声道复制并左对齐() {
        let frame = verbatim_frame(0, 8, &[&[1, -1, 127]]);
        let (result, _, output) = decode_one(1, 8, &frame);
        let decoded = result.unwrap();

        assert_eq!(decoded.pcm_bytes, 3 * 2 * 2);
        assert_eq!(
            pcm16(&output[..decoded.pcm_bytes]),
            vec![256, 256, -256, -256, 127 << 8, 127 << 8],
        );
    }

    #[test]
    fn test_24位使用32位容器() {
        let frame = verbatim_frame(1, 24, &[&[0x7FFFFF, -1], &[-0x800000, 5]]);
        let (result, _, output) = decode_one(2, 24, &frame);
        let decoded = result.unwrap();

        let samples: Vec<i32> = output[..decoded.pcm_bytes]
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(samples, vec![0x7FFFFF, -0x800000, -1, 5]);
    }

    #[test]
    fn test_mid_side_还原() {
        // left = [10, -3], right = [4, 7] -> mid = (l + r) >> 1, side = l - r
        let left = [10, -3];
        let right = [4, 7];
        let mid: Vec<i32> = left.iter().zip(&right).map(|(l, r)| (l + r) >> 1).collect();
        let side: Vec<i32> = left.iter().zip(&right).map(|(l, r)| l - r).collect();

        let frame = verbatim_frame(10, 16, &[&mid, &side]);
        let (result, ctx, output) = decode_one(2, 16, &frame);
        let decoded = result.unwrap();

        assert_eq!(ctx.decorrelation, Decorrelation::MidSide);
        assert_eq!(pcm16(&output[..decoded.pcm_bytes]), vec![10, 4, -3, 7]);
    }

    #[test]
    fn test_left_side_与_right_side() {
        let mut ch0 = [10, 20];
        let mut ch1 = [3, -5];
        decorrelate(Decorrelation::LeftSide, &mut ch0, &mut ch1);
        assert_eq!((ch0, ch1), ([10, 20], [7, 25]));

        let mut ch0 = [3, -5];
        let mut ch1 = [7, 25];
        decorrelate(Decorrelation::RightSide, &mut ch0, &mut ch1);
        assert_eq!((ch0, ch1), ([10, 20], [7, 25]));
    }

    #[test]
    fn test_截断帧返回_need_more_data() {
        let frame = verbatim_frame(1, 16, &[&[1, 2, 3, 4], &[5, 6, 7, 8]]);
        let (result, ctx, _) = decode_one(2, 16, &frame[..frame.len() - 3]);
        assert!(matches!(result, Err(LiuError::NeedMoreData)));
        assert_eq!(ctx.frame_size, 0);
    }

    #[test]
    fn test_crc16_错误() {
        let mut frame = verbatim_frame(1, 16, &[&[1, 2], &[3, 4]]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let (result, ctx, _) = decode_one(2, 16, &frame);
        assert!(matches!(result, Err(LiuError::InvalidData(_))));
        assert_eq!(ctx.frame_size, 0);
    }

    #[test]
    fn test_声道数不一致() {
        let frame = verbatim_frame(0, 16, &[&[1, 2]]);
        let (result, _, _) = decode_one(2, 16, &frame);
        assert!(matches!(result, Err(LiuError::InvalidData(_))));
    }

    #[test]
    fn test_定位帧() {
        let frame = verbatim_frame(1, 16, &[&[1, 2], &[3, 4]]);
        let mut data = vec![0x00, 0x12, 0x34];
        data.extend_from_slice(&frame);

        let ctx = DecodeContext::new(test_params(2, 16, 16)).unwrap();
        let decoder = NativeFrameDecoder::new();
        assert_eq!(decoder.locate_frame(&data, &ctx), Some(3));
        assert_eq!(decoder.locate_frame(&data[..3], &ctx), None);
        // 块末尾只剩同步码第一个字节
        assert_eq!(decoder.locate_frame(&data[..4], &ctx), Some(3));
    }
}
