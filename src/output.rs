//! PCM 输出缓冲区.
//!
//! 容量只增不减: 需求超过高水位时按需求的 2 倍重新分配, 更小的需求直接复用.
//! 解码过程中不会自动扩容, 容量不足是致命错误, 只能在打开流时扩容.

use log::debug;

use crate::error::AllocError;

/// PCM 输出缓冲区
#[derive(Debug, Default)]
pub struct PcmBuffer {
    data: Vec<u8>,
    /// 最近一个输出块的字节数
    block_len: usize,
}

impl PcmBuffer {
    /// 创建空缓冲区, 首次 `ensure_capacity` 时才分配
    pub fn new() -> Self {
        Self::default()
    }

    /// 已分配容量 (高水位)
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 保证容量不小于 `required`
    ///
    /// 需要扩容时分配 `2 × required` 字节. 失败时缓冲区保持原样.
    pub fn ensure_capacity(&mut self, required: usize) -> Result<(), AllocError> {
        if required <= self.data.len() {
            return Ok(());
        }

        let target = required
            .checked_mul(2)
            .ok_or(AllocError::Overflow { required })?;
        let mut data = Vec::new();
        data.try_reserve_exact(target)
            .map_err(|_| AllocError::OutOfMemory { requested: target })?;
        data.resize(target, 0);

        debug!("输出缓冲区扩容: {} -> {} 字节", self.data.len(), target);
        self.data = data;
        self.block_len = 0;
        Ok(())
    }

    /// 最近一个输出块
    pub fn block(&self) -> &[u8] {
        &self.data[..self.block_len]
    }

    /// 整个可写区域, 交给帧解码器写入
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn set_block_len(&mut self, len: usize) {
        self.block_len = len.min(self.data.len());
    }
}
