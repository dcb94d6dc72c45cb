//! 滑动窗口输入缓冲区.
//!
//! 固定容量的字节区, 只保存尚未解码的压缩数据:
//! - `[0, read_pos)`: 已消费, 不再被解释为数据
//! - `[read_pos, valid)`: 待处理
//!
//! 始终满足 `read_pos <= valid <= capacity`. 消费与补充数据前都会把未读字节
//! 搬到起始处, 因此帧的长度变化不会让内存占用超过一个缓冲区.

use std::io;

use liu_codec::StreamParameters;
use liu_format::ByteSource;
use log::debug;

use crate::config::DecoderConfig;
use crate::error::AllocError;

/// 一次补充数据的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    /// 有待处理数据, 继续定位与解码
    Continue,
    /// 暂时没有数据, 稍后重试
    NoDataRetry,
    /// 没有数据且字节源已结束
    Exhausted,
}

/// 滑动窗口输入缓冲区
#[derive(Debug)]
pub struct InputBuffer {
    data: Vec<u8>,
    read_pos: usize,
    valid: usize,
    /// 流结束标志, 只在 [`InputBuffer::reset`] 时清除
    eos: bool,
    /// 待处理字节少于此值时补充
    refill_threshold: usize,
    refills: u64,
    bytes_read: u64,
}

impl InputBuffer {
    /// 按流参数计算输入缓冲区容量
    ///
    /// 最大帧字节数加余量, 未知时使用固定容量, 且不低于下限.
    pub fn capacity_for(params: &StreamParameters, config: &DecoderConfig) -> usize {
        let base = if params.max_frame_size == 0 {
            config.unknown_frame_size_buffer
        } else {
            (params.max_frame_size as usize).saturating_add(config.input_slack)
        };
        base.max(config.min_input_buffer)
    }

    /// 分配指定容量的缓冲区
    pub fn with_capacity(capacity: usize, config: &DecoderConfig) -> Result<Self, AllocError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| AllocError::OutOfMemory {
                requested: capacity,
            })?;
        data.resize(capacity, 0);

        Ok(Self {
            data,
            read_pos: 0,
            valid: 0,
            eos: false,
            refill_threshold: capacity / config.refill_threshold_divisor.max(1),
            refills: 0,
            bytes_read: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 读游标
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// 有效字节数 (含已消费部分)
    pub fn valid(&self) -> usize {
        self.valid
    }

    /// 待处理字节数
    pub fn unread(&self) -> usize {
        self.valid - self.read_pos
    }

    /// 待处理字节
    pub fn pending(&self) -> &[u8] {
        &self.data[self.read_pos..self.valid]
    }

    /// 字节源是否已经结束
    pub fn is_eos(&self) -> bool {
        self.eos
    }

    /// 待处理数据已占满整个缓冲区
    pub fn is_full(&self) -> bool {
        self.unread() == self.data.len()
    }

    /// 累计补充次数
    pub fn refills(&self) -> u64 {
        self.refills
    }

    /// 累计从字节源读取的字节数
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// 需要时从字节源补充数据
    ///
    /// 待处理字节少于阈值 (或 `force` 为真) 且流未结束时, 先压缩再读满空闲尾部.
    /// 读取出错时已读到的字节保留在缓冲区中.
    pub fn refill(&mut self, source: &mut dyn ByteSource, force: bool) -> io::Result<RefillOutcome> {
        let unread = self.unread();
        if (force || unread < self.refill_threshold) && !self.eos && unread < self.data.len() {
            self.compact();
            self.refills += 1;

            let before = self.valid;
            let mut result = Ok(());
            while self.valid < self.data.len() {
                match source.read(&mut self.data[self.valid..]) {
                    Ok(0) => break,
                    Ok(n) => self.valid += n,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            let read = self.valid - before;
            self.bytes_read += read as u64;
            result?;

            if self.valid < self.data.len() && source.is_eof() {
                self.eos = true;
            }
            debug!(
                "补充输入: 读取 {} 字节, 待处理 {} / {} 字节, eos={}",
                read,
                self.valid,
                self.data.len(),
                self.eos,
            );
        }

        if self.unread() == 0 {
            return Ok(if self.eos {
                RefillOutcome::Exhausted
            } else {
                RefillOutcome::NoDataRetry
            });
        }
        Ok(RefillOutcome::Continue)
    }

    /// 消费 `count` 个待处理字节并压缩
    ///
    /// 超出待处理字节数的部分被忽略.
    pub fn consume(&mut self, count: usize) {
        self.read_pos += count.min(self.unread());
        self.compact();
    }

    /// 丢弃全部待处理字节
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.valid = 0;
    }

    /// 丢弃全部数据并清除流结束标志 (流重新开始时调用)
    pub fn reset(&mut self) {
        self.clear();
        self.eos = false;
    }

    /// 把未读字节搬到起始处
    fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.copy_within(self.read_pos..self.valid, 0);
        self.valid -= self.read_pos;
        self.read_pos = 0;
    }
}
