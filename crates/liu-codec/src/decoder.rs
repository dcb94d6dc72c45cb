//! 帧解码器契约.
//!
//! 解码管线只通过这两个操作与帧解码器交互, 不关心子帧、预测和熵编码的细节.

use liu_core::LiuResult;

use crate::context::DecodeContext;

/// 一次成功解码的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// 每声道采样数
    pub block_size: u32,
    /// 帧占用的字节数 (从帧同步码算起)
    pub frame_size: usize,
    /// 写入输出缓冲区的 PCM 字节数
    pub pcm_bytes: usize,
}

/// 帧解码器 trait
///
/// `decode_frame` 成功时必须更新上下文的 `block_size`, `frame_size` 和 `decorrelation`;
/// 失败时可把 `frame_size` 设为跳过提示, 不知道则设为 0.
/// 帧在片段末尾被截断时应返回 `LiuError::NeedMoreData`, 管线据此补充数据而不是丢帧.
pub trait FrameDecoder: Send {
    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 在字节片段中定位下一个帧同步码, 返回其偏移
    fn locate_frame(&self, data: &[u8], ctx: &DecodeContext) -> Option<usize>;

    /// 解码从片段起始处开始的一个帧, 交错 PCM 写入 `output`
    fn decode_frame(
        &mut self,
        ctx: &mut DecodeContext,
        data: &[u8],
        output: &mut [u8],
    ) -> LiuResult<DecodedFrame>;
}
