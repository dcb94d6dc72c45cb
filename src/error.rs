//! 解码管线错误类型.

use std::io;

use liu_format::ProbeErrorKind;
use thiserror::Error;

/// 使管线进入终止状态的错误
///
/// 可复制比较: 管线进入 `Fatal` 后每次 `step` 都返回同一个错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// 打开流失败
    #[error("打开流失败: {0:?}")]
    Probe(ProbeErrorKind),

    /// 流声明的输出块大于输出缓冲区容量
    #[error("输出块 {required} 字节超过输出缓冲区容量 {capacity} 字节")]
    Sizing { required: usize, capacity: usize },

    /// 缓冲区分配失败
    #[error("分配 {requested} 字节失败")]
    Allocation { requested: usize },

    /// 字节源不可恢复的 I/O 错误
    #[error("字节源 I/O 错误: {0:?}")]
    Io(io::ErrorKind),

    /// 管线已关闭
    #[error("管线已关闭")]
    Closed,
}

/// 输出缓冲区扩容失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// 翻倍后的容量溢出
    #[error("容量计算溢出: 需要 {required} 字节")]
    Overflow { required: usize },

    /// 分配器拒绝
    #[error("分配 {requested} 字节失败")]
    OutOfMemory { requested: usize },
}

impl AllocError {
    /// 请求的字节数 (溢出时为触发溢出的需求)
    pub fn requested(&self) -> usize {
        match *self {
            Self::Overflow { required } => required,
            Self::OutOfMemory { requested } => requested,
        }
    }
}

impl From<AllocError> for FatalError {
    fn from(err: AllocError) -> Self {
        Self::Allocation {
            requested: err.requested(),
        }
    }
}
