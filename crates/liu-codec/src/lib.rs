//! # liu-codec
//!
//! Liu 流式解码框架的帧解码层.
//!
//! 定义流参数 ([`StreamParameters`])、每条流独占的解码上下文 ([`DecodeContext`]),
//! 以及解码管线消费的帧解码器契约 ([`FrameDecoder`]):
//! - `locate_frame`: 在字节片段中定位下一个帧同步码
//! - `decode_frame`: 把一个帧解码为交错 PCM 并报告消耗的字节数
//!
//! [`NativeFrameDecoder`] 是契约的纯 Rust FLAC 实现.

pub mod context;
pub mod decoder;
pub mod native;
pub mod params;

// 重导出常用类型
pub use context::{DecodeContext, Decorrelation};
pub use decoder::{DecodedFrame, FrameDecoder};
pub use native::NativeFrameDecoder;
pub use params::StreamParameters;
