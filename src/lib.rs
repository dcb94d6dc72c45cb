//! # Liu (流)
//!
//! 纯 Rust 实现的流式 FLAC 解码管线, 面向内存受限的实时播放.
//!
//! 每次 [`DecodePipeline::step`] 只做有限的工作: 最多一次补充读取、一次帧定位、
//! 一次帧解码. 所有缓冲区在打开流时按 STREAMINFO 一次性分配, 解码过程中不再分配.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use liu::format::MemorySource;
//! use liu::{DecodePipeline, StepOutcome};
//!
//! let data = std::fs::read("music.flac").unwrap();
//! let mut pipeline = DecodePipeline::open(MemorySource::from_data(data)).unwrap();
//! while let StepOutcome::Produced(_) | StepOutcome::NoDataRetry = pipeline.step() {}
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 错误类型、比特流读取、CRC |
//! | `liu-codec` | 流参数、解码上下文、帧解码器 |
//! | `liu-format` | 字节源、STREAMINFO 解析 |

pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod output;
pub mod pipeline;

/// 核心类型与工具
pub use liu_core as core;

/// 帧解码
pub use liu_codec as codec;

/// 字节源与流头部解析
pub use liu_format as format;

pub use config::DecoderConfig;
pub use error::{AllocError, FatalError};
pub use input::{InputBuffer, RefillOutcome};
pub use output::PcmBuffer;
pub use pipeline::{DecodePipeline, PcmBlock, PipelineState, PipelineStats, StepOutcome};

/// 获取 Liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
