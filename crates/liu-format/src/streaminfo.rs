//! FLAC 流头部解析.
//!
//! ```text
//! [ID3v2 标签]: "ID3" + 版本 (2 bytes) + 标志 (1 byte) + syncsafe 大小 (4 bytes), 可重复
//! Magic:        "fLaC" (4 bytes)
//! Metadata:     一系列 metadata block
//!   header:     is_last (1 bit) + type (7 bits) + length (24 bits, 大端)
//! Frames:       音频帧序列
//! ```
//!
//! STREAMINFO 块 (type 0, 34 bytes):
//! ```text
//! min_block_size:  16 bits
//! max_block_size:  16 bits
//! min_frame_size:  24 bits
//! max_frame_size:  24 bits
//! sample_rate:     20 bits
//! channels:        3 bits  (channels - 1)
//! bits_per_sample: 5 bits  (bits - 1)
//! total_samples:   36 bits
//! md5:             128 bits
//! ```

use std::io;

use liu_codec::StreamParameters;
use log::{debug, warn};
use thiserror::Error;

use crate::io::ByteSource;

/// FLAC 流标记
const FLAC_MAGIC: &[u8; 4] = b"fLaC";
/// ID3v2 标签头长度
const ID3_HEADER_LEN: u64 = 10;
/// STREAMINFO 块长度
const STREAMINFO_LEN: usize = 34;
/// STREAMINFO 块类型
const BLOCK_TYPE_STREAMINFO: u8 = 0;

/// 打开流时的错误
#[derive(Debug, Error)]
pub enum ProbeError {
    /// 没有找到 `fLaC` 标记
    #[error("不是 FLAC 流: 未找到 fLaC 标记")]
    NotFlac,

    /// STREAMINFO 缺失或内容无效
    #[error("STREAMINFO 无效: {0}")]
    BadStreamInfo(String),

    /// 声道数不是 1 或 2
    #[error("不支持的声道数: {0}")]
    UnsupportedChannelCount(u32),

    /// 头部读取时遇到流末尾
    #[error("流头部被截断")]
    Truncated,

    /// 底层 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// 缓冲区分配失败
    #[error("分配 {0} 字节失败")]
    Allocation(usize),
}

/// [`ProbeError`] 的种类, 不携带负载, 可复制和比较
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeErrorKind {
    NotFlac,
    BadStreamInfo,
    UnsupportedChannelCount,
    Truncated,
    Io,
    Allocation,
}

impl ProbeError {
    /// 获取错误种类
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            Self::NotFlac => ProbeErrorKind::NotFlac,
            Self::BadStreamInfo(_) => ProbeErrorKind::BadStreamInfo,
            Self::UnsupportedChannelCount(_) => ProbeErrorKind::UnsupportedChannelCount,
            Self::Truncated => ProbeErrorKind::Truncated,
            Self::Io(_) => ProbeErrorKind::Io,
            Self::Allocation(_) => ProbeErrorKind::Allocation,
        }
    }
}

/// `io::Error` 不能复制, 复制时保留种类和消息
impl Clone for ProbeError {
    fn clone(&self) -> Self {
        match self {
            Self::NotFlac => Self::NotFlac,
            Self::BadStreamInfo(msg) => Self::BadStreamInfo(msg.clone()),
            Self::UnsupportedChannelCount(n) => Self::UnsupportedChannelCount(*n),
            Self::Truncated => Self::Truncated,
            Self::Io(err) => Self::Io(io::Error::new(err.kind(), err.to_string())),
            Self::Allocation(n) => Self::Allocation(*n),
        }
    }
}

/// 流头部解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// 流参数
    pub params: StreamParameters,
    /// 音频数据起始偏移 (最后一个 metadata block 之后), 重新开始播放时定位到这里
    pub data_start: u64,
}

/// 从当前位置解析 FLAC 流头部
///
/// 成功返回时字节源恰好位于第一个音频帧之前.
pub fn parse_stream_header(source: &mut dyn ByteSource) -> Result<StreamHeader, ProbeError> {
    skip_id3_tags(source)?;

    let mut params = None;
    loop {
        let mut header = [0u8; 4];
        read_exact(source, &mut header)?;
        let is_last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        let length = u32::from_be_bytes([0, header[1], header[2], header[3]]);

        if block_type == BLOCK_TYPE_STREAMINFO {
            if params.is_some() {
                return Err(ProbeError::BadStreamInfo("出现多个 STREAMINFO".into()));
            }
            if length as usize != STREAMINFO_LEN {
                return Err(ProbeError::BadStreamInfo(format!(
                    "STREAMINFO 长度 {} 不等于 {}",
                    length, STREAMINFO_LEN,
                )));
            }
            let mut data = [0u8; STREAMINFO_LEN];
            read_exact(source, &mut data)?;
            params = Some(parse_stream_info(&data)?);
        } else {
            if params.is_none() {
                warn!("STREAMINFO 不是第一个 metadata block, 类型 {}", block_type);
            }
            debug!("跳过 metadata block: type={}, 大小={}", block_type, length);
            source.skip(u64::from(length))?;
        }

        if is_last {
            break;
        }
    }

    let params =
        params.ok_or_else(|| ProbeError::BadStreamInfo("缺少 STREAMINFO 块".into()))?;
    let data_start = source.position()?;

    debug!(
        "STREAMINFO: rate={}, channels={}, bps={}, total_samples={}, block_size={}-{}, frame_size={}-{}, 数据起始={}",
        params.sample_rate,
        params.channels,
        params.bits_per_sample,
        params.total_samples,
        params.min_block_size,
        params.max_block_size,
        params.min_frame_size,
        params.max_frame_size,
        data_start,
    );

    Ok(StreamHeader { params, data_start })
}

/// 跳过所有前置 ID3v2 标签并校验 `fLaC` 标记
fn skip_id3_tags(source: &mut dyn ByteSource) -> Result<(), ProbeError> {
    loop {
        let start = source.position()?;
        let mut magic = [0u8; 4];
        read_exact(source, &mut magic)?;

        if &magic == FLAC_MAGIC {
            return Ok(());
        }
        if &magic[..3] != b"ID3" {
            return Err(ProbeError::NotFlac);
        }

        // 剩余的标签头: 次版本号 + 标志 + syncsafe 大小
        let mut rest = [0u8; 6];
        read_exact(source, &mut rest)?;
        let size = syncsafe_u32([rest[2], rest[3], rest[4], rest[5]]);
        debug!("跳过 ID3v2 标签: 偏移={}, 大小={}", start, size);
        source.seek(start + ID3_HEADER_LEN + u64::from(size))?;
    }
}

/// 解码 syncsafe 整数 (每字节 7 位有效)
fn syncsafe_u32(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

/// 解析 STREAMINFO 块并校验约束
fn parse_stream_info(data: &[u8; STREAMINFO_LEN]) -> Result<StreamParameters, ProbeError> {
    let min_block_size = u16::from_be_bytes([data[0], data[1]]);
    let max_block_size = u16::from_be_bytes([data[2], data[3]]);
    let min_frame_size = u32::from_be_bytes([0, data[4], data[5], data[6]]);
    let max_frame_size = u32::from_be_bytes([0, data[7], data[8], data[9]]);

    // bytes 10-17: sample_rate(20) + channels(3) + bps(5) + total_samples(36)
    let mut packed = [0u8; 8];
    packed.copy_from_slice(&data[10..18]);
    let packed = u64::from_be_bytes(packed);
    let sample_rate = (packed >> 44) as u32;
    let channels = ((packed >> 41) & 0x07) as u32 + 1;
    let bits_per_sample = ((packed >> 36) & 0x1F) as u32 + 1;
    let total_samples = packed & 0x0F_FFFF_FFFF;

    if !(1..=2).contains(&channels) {
        return Err(ProbeError::UnsupportedChannelCount(channels));
    }
    if max_block_size == 0 {
        return Err(ProbeError::BadStreamInfo("max_block_size 为 0".into()));
    }

    Ok(StreamParameters {
        min_block_size,
        max_block_size,
        min_frame_size,
        max_frame_size,
        sample_rate,
        channels,
        bits_per_sample,
        total_samples,
    })
}

fn read_exact(source: &mut dyn ByteSource, buf: &mut [u8]) -> Result<(), ProbeError> {
    if source.read_fully(buf)? < buf.len() {
        return Err(ProbeError::Truncated);
    }
    Ok(())
}
