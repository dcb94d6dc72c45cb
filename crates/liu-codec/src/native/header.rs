//! FLAC 帧头解析与帧同步码搜索.
//!
//! ```text
//! Sync code:     14 bits (0b11111111111110)
//! Reserved:      1 bit
//! Blocking:      1 bit (0=fixed, 1=variable)
//! Block size:    4 bits (encoded)
//! Sample rate:   4 bits (encoded)
//! Channel:       4 bits (assignment)
//! Sample size:   3 bits (encoded)
//! Reserved:      1 bit (0)
//! Frame/Sample#: UTF-8 encoded
//! [Block size]:  8 or 16 bits (if indicated)
//! [Sample rate]: 8 or 16 bits (if indicated)
//! CRC-8:         8 bits
//! ```

use liu_core::bitreader::{BitReader, utf8_sequence_len};
use liu_core::{LiuError, LiuResult, crc};

use crate::context::Decorrelation;
use crate::params::StreamParameters;

/// FLAC 同步码 (14 bits: 0b11111111111110)
const FLAC_SYNC_CODE: u16 = 0xFFF8;
/// FLAC 同步码掩码 (高 14 位 + 保留位)
const FLAC_SYNC_MASK: u16 = 0xFFFE;

/// 声道分配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelAssignment {
    /// 独立声道, 参数为声道数
    Independent(u32),
    LeftSide,
    RightSide,
    MidSide,
}

impl ChannelAssignment {
    pub(crate) fn channels(self) -> u32 {
        match self {
            Self::Independent(n) => n,
            _ => 2,
        }
    }

    pub(crate) fn decorrelation(self) -> Decorrelation {
        match self {
            Self::Independent(_) => Decorrelation::Independent,
            Self::LeftSide => Decorrelation::LeftSide,
            Self::RightSide => Decorrelation::RightSide,
            Self::MidSide => Decorrelation::MidSide,
        }
    }

    /// 子帧的有效位深: side 声道多 1 位
    pub(crate) fn subframe_bps(self, channel: u32, bps: u32) -> u32 {
        match self {
            Self::LeftSide | Self::MidSide if channel == 1 => bps + 1,
            Self::RightSide if channel == 0 => bps + 1,
            _ => bps,
        }
    }
}

/// FLAC 帧头信息
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    /// 块大小 (每声道采样数)
    pub block_size: u32,
    /// 采样率
    pub sample_rate: u32,
    /// 声道分配模式
    pub assignment: ChannelAssignment,
    /// 位深
    pub bits_per_sample: u32,
}

/// 解析帧头并校验 CRC-8
///
/// 采样率与位深编码为 0 时回落到流参数.
pub(crate) fn parse_frame_header(
    br: &mut BitReader<'_>,
    raw: &[u8],
    params: &StreamParameters,
) -> LiuResult<FrameHeader> {
    let sync = br.read_bits(14)?;
    if sync != 0b11111111111110 {
        return Err(LiuError::InvalidData(format!(
            "无效的 FLAC 同步码: 0x{:04X}",
            sync,
        )));
    }
    if br.read_bits(1)? != 0 {
        return Err(LiuError::InvalidData("FLAC 帧头保留位非 0".into()));
    }
    let _blocking_strategy = br.read_bits(1)?;

    let bs_code = br.read_bits(4)?;
    let sr_code = br.read_bits(4)?;
    let ch_code = br.read_bits(4)?;
    let ss_code = br.read_bits(3)?;
    if br.read_bits(1)? != 0 {
        return Err(LiuError::InvalidData("FLAC 帧头保留位非 0".into()));
    }

    // 帧号或采样号, 管线自己维护采样位置
    let _position = br.read_utf8_u64()?;

    let block_size = match bs_code {
        0 => return Err(LiuError::InvalidData("FLAC block_size code 0 保留".into())),
        1 => 192,
        2..=5 => 576 << (bs_code - 2),
        6 => br.read_bits(8)? + 1,
        7 => br.read_bits(16)? + 1,
        _ => 256 << (bs_code - 8),
    };

    let sample_rate = match sr_code {
        0 => params.sample_rate,
        1 => 88200,
        2 => 176400,
        3 => 192000,
        4 => 8000,
        5 => 16000,
        6 => 22050,
        7 => 24000,
        8 => 32000,
        9 => 44100,
        10 => 48000,
        11 => 96000,
        12 => br.read_bits(8)? * 1000,
        13 => br.read_bits(16)?,
        14 => br.read_bits(16)? * 10,
        _ => return Err(LiuError::InvalidData("FLAC sample_rate code 15 无效".into())),
    };

    let assignment = match ch_code {
        0..=7 => ChannelAssignment::Independent(ch_code + 1),
        8 => ChannelAssignment::LeftSide,
        9 => ChannelAssignment::RightSide,
        10 => ChannelAssignment::MidSide,
        _ => {
            return Err(LiuError::InvalidData(format!(
                "无效的 FLAC 声道分配: {}",
                ch_code,
            )));
        }
    };

    let bits_per_sample = match ss_code {
        0 => params.bits_per_sample,
        1 => 8,
        2 => 12,
        4 => 16,
        5 => 20,
        6 => 24,
        7 => 32,
        _ => return Err(LiuError::InvalidData("FLAC sample_size code 3 保留".into())),
    };

    let header_end = br.byte_position();
    let crc_read = br.read_bits(8)? as u8;
    let crc_calc = crc::crc8(&raw[..header_end]);
    if crc_read != crc_calc {
        return Err(LiuError::InvalidData(format!(
            "FLAC 帧头 CRC-8 不匹配: 读取=0x{:02X}, 计算=0x{:02X}",
            crc_read, crc_calc,
        )));
    }

    Ok(FrameHeader {
        block_size,
        sample_rate,
        assignment,
        bits_per_sample,
    })
}

/// 在缓冲区中搜索下一个有效帧同步码
///
/// 每个候选位置都检查帧头字段合法性并校验 CRC-8, 以排除数据中的巧合匹配.
///
/// 末尾孤立的 0xFF 可能是被截断的同步码, 同样作为候选返回.
pub(crate) fn find_sync_code(buf: &[u8]) -> Option<usize> {
    let found = (0..buf.len().saturating_sub(1)).find(|&i| {
        let word = u16::from_be_bytes([buf[i], buf[i + 1]]);
        word & FLAC_SYNC_MASK == FLAC_SYNC_CODE && validate_frame_header(&buf[i..])
    });
    found.or_else(|| match buf.last() {
        Some(0xFF) => Some(buf.len() - 1),
        _ => None,
    })
}

/// 验证候选帧头
///
/// 数据不足以覆盖 CRC-8 时只做字段检查; 真正的截断由解码阶段报告.
fn validate_frame_header(data: &[u8]) -> bool {
    if data.len() < 5 {
        // 片段末尾的候选同步码, 交给解码阶段判断是否截断
        return data.len() >= 2;
    }

    let byte2 = data[2];
    let byte3 = data[3];

    let bs_code = byte2 >> 4;
    let sr_code = byte2 & 0x0F;
    let ch_code = byte3 >> 4;
    let ss_code = (byte3 >> 1) & 0x07;

    if byte3 & 0x01 != 0 || bs_code == 0 || sr_code == 15 || ch_code > 10 || ss_code == 3 {
        return false;
    }

    let Some(utf8_len) = utf8_sequence_len(data[4]) else {
        return false;
    };
    let utf8_end = 4 + utf8_len;
    if utf8_end > data.len() {
        return true;
    }
    if data[5..utf8_end].iter().any(|&b| b & 0xC0 != 0x80) {
        return false;
    }

    let mut pos = utf8_end;
    pos += match bs_code {
        6 => 1,
        7 => 2,
        _ => 0,
    };
    pos += match sr_code {
        12 => 1,
        13 | 14 => 2,
        _ => 0,
    };

    if pos >= data.len() {
        return true;
    }
    data[pos] == crc::crc8(&data[..pos])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;

    /// 44100 Hz, 4096 块, 双声道独立, 16 位, 帧号 0
    fn header_bytes() -> Vec<u8> {
        let mut h = vec![0xFF, 0xF8, 0xC9, 0x18, 0x00];
        h.push(crc::crc8(&h));
        h
    }

    #[test]
    fn test_解析帧头() {
        let data = header_bytes();
        let params = test_params(2, 16, 4096);
        let mut br = BitReader::new(&data);
        let header = parse_frame_header(&mut br, &data, &params).unwrap();
        assert_eq!(header.block_size, 4096);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.assignment, ChannelAssignment::Independent(2));
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(br.byte_position(), data.len());
    }

    #[test]
    fn test_帧头_crc8_错误() {
        let mut data = header_bytes();
        let last = data.len() - 1;
        data[last] ^= 0x55;
        let params = test_params(2, 16, 4096);
        let mut br = BitReader::new(&data);
        assert!(matches!(
            parse_frame_header(&mut br, &data, &params),
            Err(LiuError::InvalidData(_))
        ));
    }

    #[test]
    fn test_搜索同步码跳过假同步() {
        let mut buf = vec![0x00, 0x11, 0xFF, 0xF8, 0x00, 0x00, 0x00, 0x00];
        let valid_at = buf.len();
        buf.extend_from_slice(&header_bytes());
        // 位置 2 的 0xFFF8 块大小编码为 0, 必须被拒绝
        assert_eq!(find_sync_code(&buf), Some(valid_at));
    }

    #[test]
    fn test_无同步码() {
        assert_eq!(find_sync_code(&[0x12, 0x34, 0x56, 0x78, 0x9A]), None);
        assert_eq!(find_sync_code(&[]), None);
    }

    #[test]
    fn test_side_声道位深() {
        assert_eq!(ChannelAssignment::LeftSide.subframe_bps(1, 16), 17);
        assert_eq!(ChannelAssignment::RightSide.subframe_bps(0, 16), 17);
        assert_eq!(ChannelAssignment::MidSide.subframe_bps(0, 16), 16);
        assert_eq!(ChannelAssignment::Independent(2).subframe_bps(1, 16), 16);
    }
}
