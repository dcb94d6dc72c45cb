//! # liu-core
//!
//! Liu 流式解码框架核心库, 提供错误类型、比特流读取与 CRC 校验.
//!
//! 上层的帧解码器 (`liu-codec`) 与容器解析 (`liu-format`) 都建立在本 crate 之上.

pub mod bitreader;
pub mod crc;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use error::{LiuError, LiuResult};
