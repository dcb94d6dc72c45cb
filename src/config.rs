//! 解码管线配置.

use serde::{Deserialize, Serialize};

/// 解码管线配置
///
/// 所有字段都有默认值, JSON 配置文件里只需写要覆盖的字段.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 输入缓冲区容量下限
    pub min_input_buffer: usize,
    /// 在流声明的最大帧字节数之上追加的余量
    pub input_slack: usize,
    /// 最大帧字节数未知 (STREAMINFO 为 0) 时使用的输入缓冲区容量
    pub unknown_frame_size_buffer: usize,
    /// 待处理字节少于 `capacity / refill_threshold_divisor` 时补充数据
    pub refill_threshold_divisor: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_input_buffer: 4096,
            input_slack: 16,
            unknown_frame_size_buffer: 16 * 1024,
            refill_threshold_divisor: 2,
        }
    }
}
