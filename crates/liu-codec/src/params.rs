//! 流参数.
//!
//! 由 STREAMINFO 解析得到, 打开流之后不再变化.
//! 所有缓冲区的尺寸都从这里推导.

/// 流参数 (STREAMINFO 字段)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParameters {
    /// 最小块大小 (每声道采样数)
    pub min_block_size: u16,
    /// 最大块大小 (每声道采样数)
    pub max_block_size: u16,
    /// 最小帧字节数 (0 表示未知)
    pub min_frame_size: u32,
    /// 最大帧字节数 (0 表示未知)
    pub max_frame_size: u32,
    /// 采样率
    pub sample_rate: u32,
    /// 声道数 (只支持 1 或 2)
    pub channels: u32,
    /// 位深
    pub bits_per_sample: u32,
    /// 总采样数 (每声道, 0 表示未知)
    pub total_samples: u64,
}

impl StreamParameters {
    /// 输出声道数: 单声道上混为双声道
    pub fn output_channels(&self) -> u32 {
        if self.channels == 1 { 2 } else { self.channels }
    }

    /// 输出 PCM 每个采样占用的字节数
    pub fn bytes_per_sample(&self) -> usize {
        if self.bits_per_sample > 16 { 4 } else { 2 }
    }

    /// 单个最坏情况输出块的字节数
    ///
    /// `max_block_size × output_channels × bytes_per_sample`
    pub fn output_block_bytes(&self) -> usize {
        usize::from(self.max_block_size)
            * self.output_channels() as usize
            * self.bytes_per_sample()
    }

    /// 流时长 (秒), 总采样数未知时返回 `None`
    pub fn duration_secs(&self) -> Option<f64> {
        if self.sample_rate == 0 || self.total_samples == 0 {
            return None;
        }
        Some(self.total_samples as f64 / f64::from(self.sample_rate))
    }
}

#[cfg(test)]
pub(crate) fn test_params(
    channels: u32,
    bits_per_sample: u32,
    max_block_size: u16,
) -> StreamParameters {
    StreamParameters {
        min_block_size: max_block_size,
        max_block_size,
        min_frame_size: 0,
        max_frame_size: 0,
        sample_rate: 44100,
        channels,
        bits_per_sample,
        total_samples: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_输出块大小推导() {
        assert_eq!(test_params(2, 16, 4096).output_block_bytes(), 4096 * 2 * 2);
        // 单声道上混为双声道
        assert_eq!(test_params(1, 8, 256).output_block_bytes(), 256 * 2 * 2);
        // 24 位使用 4 字节容器
        assert_eq!(test_params(2, 24, 1152).output_block_bytes(), 1152 * 2 * 4);
    }

    #[test]
    fn test_时长() {
        let mut params = test_params(2, 16, 4096);
        assert_eq!(params.duration_secs(), None);
        params.total_samples = 88200;
        assert_eq!(params.duration_secs(), Some(2.0));
    }
}
