//! 解码上下文.
//!
//! 每条打开的流独占一个 [`DecodeContext`]. 解码管线持有它,
//! 只在一次 `decode_frame` 调用期间以 `&mut` 借给帧解码器.

use liu_core::{LiuError, LiuResult};

use crate::params::StreamParameters;

/// 立体声去相关模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decorrelation {
    /// 独立声道
    #[default]
    Independent,
    /// 左-侧 (left, side)
    LeftSide,
    /// 右-侧 (side, right)
    RightSide,
    /// 中-侧 (mid, side)
    MidSide,
}

/// 解码上下文
#[derive(Debug)]
pub struct DecodeContext {
    params: StreamParameters,
    /// 最近一次解码帧的块大小 (每声道采样数)
    pub block_size: u32,
    /// 最近一次解码帧的字节数; 解码失败时为跳过提示, 0 表示未知
    pub frame_size: usize,
    /// 下一帧第一个采样的流内位置
    pub sample_number: u64,
    /// 最近一次解码帧的去相关模式
    pub decorrelation: Decorrelation,
    /// 声道 0 采样累积区
    channel0: Vec<i32>,
    /// 声道 1 采样累积区 (单声道流为空)
    channel1: Vec<i32>,
}

impl DecodeContext {
    /// 按流参数分配采样累积区
    pub fn new(params: StreamParameters) -> LiuResult<Self> {
        let block = usize::from(params.max_block_size);
        let channel0 = alloc_samples(block)?;
        let channel1 = if params.channels == 2 {
            alloc_samples(block)?
        } else {
            Vec::new()
        };

        Ok(Self {
            params,
            block_size: 0,
            frame_size: 0,
            sample_number: 0,
            decorrelation: Decorrelation::Independent,
            channel0,
            channel1,
        })
    }

    /// 获取流参数
    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    /// 同时可变借用两个声道的累积区
    pub fn channels_mut(&mut self) -> (&mut [i32], &mut [i32]) {
        (&mut self.channel0, &mut self.channel1)
    }

    /// 重置逐帧状态 (流重新开始时调用), 保留已分配的累积区
    pub fn reset(&mut self) {
        self.block_size = 0;
        self.frame_size = 0;
        self.sample_number = 0;
        self.decorrelation = Decorrelation::Independent;
    }
}

fn alloc_samples(len: usize) -> LiuResult<Vec<i32>> {
    let mut samples = Vec::new();
    samples
        .try_reserve_exact(len)
        .map_err(|e| LiuError::OutOfMemory(format!("采样累积区 {} 个采样: {}", len, e)))?;
    samples.resize(len, 0);
    Ok(samples)
}
