//! # liu-format
//!
//! Liu 流式解码框架的容器层.
//!
//! - [`ByteSource`]: 可读、可定位的字节源 (文件、任意 `Read + Seek`、内存)
//! - [`parse_stream_header`]: 跳过 ID3 标签, 校验 `fLaC` 标记并解析 STREAMINFO,
//!   得到 [`StreamParameters`](liu_codec::StreamParameters) 与音频数据起始偏移

pub mod io;
pub mod streaminfo;

// 重导出常用类型
pub use io::{ByteSource, FileSource, MemorySource, ReaderSource};
pub use streaminfo::{ProbeError, ProbeErrorKind, StreamHeader, parse_stream_header};
