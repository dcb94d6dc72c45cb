//! 统一错误类型定义.
//!
//! 所有 Liu crate 共用的底层错误类型, 支持跨模块传播.

use thiserror::Error;

/// Liu 框架统一错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作或码流特性
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 帧被截断在缓冲区末尾
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达比特流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),
}

impl LiuError {
    /// 是否属于 "输入不够" 一类的错误
    ///
    /// 比特流读到末尾与显式的 `NeedMoreData` 都算, 调用方据此决定是补数据还是丢帧.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Eof | Self::NeedMoreData)
    }
}

/// Liu 框架统一 Result 类型
pub type LiuResult<T> = Result<T, LiuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_截断类错误识别() {
        assert!(LiuError::Eof.is_truncation());
        assert!(LiuError::NeedMoreData.is_truncation());
        assert!(!LiuError::InvalidData("坏帧".into()).is_truncation());
    }

    #[test]
    fn test_io_错误自动转换() {
        fn open_missing() -> LiuResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?;
            Ok(())
        }
        assert!(matches!(open_missing(), Err(LiuError::Io(_))));
    }
}
