//! 流式解码管线.
//!
//! 状态机, 每次 [`DecodePipeline::step`] 最多做一次补充读取、一次帧定位和一次帧解码:
//!
//! ```text
//! Probing ──probe──> Ready ──step──> Ready / Draining / Done / Fatal
//!    └──失败──> Fatal
//! ```
//!
//! - 补充: 待处理字节不足一半时从字节源读满输入缓冲区
//! - 定位: 在待处理字节中搜索帧同步码, 找不到时丢弃全部待处理字节
//! - 解码: 成功则发布 PCM 块; 帧被截断则等待更多数据; 帧损坏则跳过并重新同步
//!
//! `Done` 与 `Fatal` 是终止状态, 之后每次 `step` 都返回相同结果且不做任何修改.

use std::io;

use liu_codec::{DecodeContext, FrameDecoder, NativeFrameDecoder, StreamParameters};
use liu_format::{ByteSource, ProbeError, parse_stream_header};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::DecoderConfig;
use crate::error::FatalError;
use crate::input::{InputBuffer, RefillOutcome};
use crate::output::PcmBuffer;

/// 管线状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// 尚未解析流头部
    Probing,
    /// 正常解码
    Ready,
    /// 字节源已结束, 仍有待处理字节
    Draining,
    /// 正常结束
    Done,
    /// 不可恢复的错误
    Fatal(FatalError),
    /// 已关闭, 资源已释放
    Closed,
}

/// 一个解码得到的 PCM 块
#[derive(Debug, Clone, Copy)]
pub struct PcmBlock<'a> {
    /// 交错小端 PCM
    pub data: &'a [u8],
    /// 采样率
    pub sample_rate: u32,
    /// 输出声道数 (单声道流上混为 2)
    pub channels: u32,
    /// 流本身的声道数
    pub source_channels: u32,
    /// 每声道采样数
    pub frame_count: u32,
    /// 每个采样的容器位数 (16 或 32)
    pub bits_per_sample: u32,
    /// 块内第一个采样的流内位置
    pub sample_number: u64,
}

/// 一次 `step` 的结果
#[derive(Debug)]
pub enum StepOutcome<'a> {
    /// 产出一个 PCM 块
    Produced(PcmBlock<'a>),
    /// 暂时没有输出, 再次调用即可
    NoDataRetry,
    /// 流已结束
    Done,
    /// 不可恢复的错误
    Fatal(FatalError),
}

/// 管线统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// 成功解码的帧数
    pub frames_decoded: u64,
    /// 因损坏被跳过的帧数
    pub corrupt_frames: u64,
    /// 重新同步时丢弃的字节数
    pub bytes_skipped: u64,
    /// 补充输入的次数
    pub refills: u64,
    /// 从字节源读取的字节数
    pub bytes_read: u64,
}

/// 打开后的流: 参数与按参数分配的资源
struct OpenStream {
    params: StreamParameters,
    data_start: u64,
    input: InputBuffer,
    context: DecodeContext,
}

/// 不借用输出缓冲区的内部结果
enum Step {
    Produced { frame_count: u32, sample_number: u64 },
    NoDataRetry,
    Done,
    Fatal(FatalError),
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// 流式解码管线
///
/// 独占字节源、帧解码器、输入缓冲区、输出缓冲区和解码上下文.
///
/// # 示例
/// ```no_run
/// use liu::format::FileSource;
/// use liu::{DecodePipeline, StepOutcome};
///
/// let source = FileSource::open("music.flac").unwrap();
/// let mut pipeline = DecodePipeline::open(source).unwrap();
/// loop {
///     match pipeline.step() {
///         StepOutcome::Produced(block) => println!("{} 个采样", block.frame_count),
///         StepOutcome::NoDataRetry => continue,
///         StepOutcome::Done => break,
///         StepOutcome::Fatal(err) => panic!("{}", err),
///     }
/// }
/// ```
pub struct DecodePipeline {
    source: Option<Box<dyn ByteSource>>,
    decoder: Box<dyn FrameDecoder>,
    config: DecoderConfig,
    output: PcmBuffer,
    stream: Option<OpenStream>,
    state: PipelineState,
    /// 上一步遇到截断帧, 下一步无视阈值补充
    force_refill: bool,
    /// 打开失败时的错误, 再次 probe 时原样返回
    probe_failure: Option<ProbeError>,
    stats: PipelineStats,
}

impl DecodePipeline {
    /// 创建管线, 处于 `Probing` 状态
    pub fn new(
        source: Box<dyn ByteSource>,
        decoder: Box<dyn FrameDecoder>,
        config: DecoderConfig,
    ) -> Self {
        Self {
            source: Some(source),
            decoder,
            config,
            output: PcmBuffer::new(),
            stream: None,
            state: PipelineState::Probing,
            force_refill: false,
            probe_failure: None,
            stats: PipelineStats::default(),
        }
    }

    /// 使用纯 Rust FLAC 解码器和默认配置打开流
    pub fn open(source: impl ByteSource + 'static) -> Result<Self, ProbeError> {
        Self::open_with(
            Box::new(source),
            Box::new(NativeFrameDecoder::new()),
            DecoderConfig::default(),
        )
    }

    /// 使用指定解码器和配置打开流
    pub fn open_with(
        source: Box<dyn ByteSource>,
        decoder: Box<dyn FrameDecoder>,
        config: DecoderConfig,
    ) -> Result<Self, ProbeError> {
        Self::open_with_output(source, decoder, config, PcmBuffer::new())
    }

    /// 打开流并复用上一条流的输出缓冲区
    ///
    /// 缓冲区容量已经足够时, 打开过程不再分配输出内存.
    pub fn open_with_output(
        source: Box<dyn ByteSource>,
        decoder: Box<dyn FrameDecoder>,
        config: DecoderConfig,
        output: PcmBuffer,
    ) -> Result<Self, ProbeError> {
        let mut pipeline = Self::new(source, decoder, config).with_output(output);
        pipeline.probe()?;
        Ok(pipeline)
    }

    /// 复用之前的输出缓冲区
    ///
    /// 只对 [`DecodePipeline::new`] 创建、尚未 probe 的管线有意义:
    /// `open`/`open_with` 返回时已经分配了输出缓冲区, 这种情况请用
    /// [`DecodePipeline::open_with_output`].
    pub fn with_output(mut self, output: PcmBuffer) -> Self {
        if self.output.capacity() < output.capacity() {
            self.output = output;
        }
        self
    }

    /// 解析流头部并分配所有缓冲区
    ///
    /// 只在 `Probing` 状态下执行一次; 已经打开时直接返回流参数.
    pub fn probe(&mut self) -> Result<&StreamParameters, ProbeError> {
        if self.state == PipelineState::Probing {
            if let Err(err) = self.open_stream() {
                warn!("打开流失败: {}", err);
                self.state = PipelineState::Fatal(FatalError::Probe(err.kind()));
                self.probe_failure = Some(err.clone());
                return Err(err);
            }
            self.state = PipelineState::Ready;
        }

        match (&self.stream, &self.probe_failure) {
            (Some(stream), _) => Ok(&stream.params),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(ProbeError::Io(io::Error::other("管线已关闭"))),
        }
    }

    fn open_stream(&mut self) -> Result<(), ProbeError> {
        let source = self
            .source
            .as_deref_mut()
            .ok_or_else(|| ProbeError::Io(io::Error::other("字节源已关闭")))?;
        let header = parse_stream_header(source)?;
        let params = header.params;

        let capacity = InputBuffer::capacity_for(&params, &self.config);
        let input = InputBuffer::with_capacity(capacity, &self.config)
            .map_err(|e| ProbeError::Allocation(e.requested()))?;
        self.output
            .ensure_capacity(params.output_block_bytes())
            .map_err(|e| ProbeError::Allocation(e.requested()))?;
        let context = DecodeContext::new(params).map_err(|_| {
            ProbeError::Allocation(
                usize::from(params.max_block_size) * params.channels as usize * 4,
            )
        })?;

        info!(
            "打开 FLAC 流: {} Hz, {} 声道, {} 位, 最大块 {} 采样, 输入缓冲 {} 字节, 输出缓冲 {} 字节, 解码器 {}",
            params.sample_rate,
            params.channels,
            params.bits_per_sample,
            params.max_block_size,
            capacity,
            self.output.capacity(),
            self.decoder.name(),
        );

        self.stream = Some(OpenStream {
            params,
            data_start: header.data_start,
            input,
            context,
        });
        Ok(())
    }

    /// 执行一步解码
    pub fn step(&mut self) -> StepOutcome<'_> {
        match self.advance() {
            Step::Produced {
                frame_count,
                sample_number,
            } => {
                let Some(stream) = self.stream.as_ref() else {
                    return StepOutcome::Fatal(FatalError::Closed);
                };
                let params = &stream.params;
                StepOutcome::Produced(PcmBlock {
                    data: self.output.block(),
                    sample_rate: params.sample_rate,
                    channels: params.output_channels(),
                    source_channels: params.channels,
                    frame_count,
                    bits_per_sample: params.bytes_per_sample() as u32 * 8,
                    sample_number,
                })
            }
            Step::NoDataRetry => StepOutcome::NoDataRetry,
            Step::Done => StepOutcome::Done,
            Step::Fatal(err) => StepOutcome::Fatal(err),
        }
    }

    fn advance(&mut self) -> Step {
        if self.state == PipelineState::Probing {
            if let Err(err) = self.probe() {
                return Step::Fatal(FatalError::Probe(err.kind()));
            }
        }
        match &self.state {
            PipelineState::Probing | PipelineState::Ready | PipelineState::Draining => {}
            PipelineState::Done => return Step::Done,
            PipelineState::Fatal(err) => return Step::Fatal(err.clone()),
            PipelineState::Closed => return Step::Fatal(FatalError::Closed),
        }

        let step = self.decode_step();
        self.state = match &step {
            Step::Done => PipelineState::Done,
            Step::Fatal(err) => PipelineState::Fatal(err.clone()),
            _ if self.stream.as_ref().is_some_and(|s| s.input.is_eos()) => {
                PipelineState::Draining
            }
            _ => PipelineState::Ready,
        };
        step
    }

    fn decode_step(&mut self) -> Step {
        let Self {
            source,
            decoder,
            output,
            stream,
            force_refill,
            stats,
            ..
        } = self;
        let (Some(source), Some(stream)) = (source.as_deref_mut(), stream.as_mut()) else {
            return Step::Fatal(FatalError::Closed);
        };

        // 1. 补充输入
        let refill = stream.input.refill(source, std::mem::take(force_refill));
        stats.refills = stream.input.refills();
        stats.bytes_read = stream.input.bytes_read();
        match refill {
            Ok(RefillOutcome::Continue) => {}
            Ok(RefillOutcome::NoDataRetry) => return Step::NoDataRetry,
            Ok(RefillOutcome::Exhausted) => {
                debug!("输入耗尽, 流结束");
                return Step::Done;
            }
            Err(e) if is_transient(&e) => {
                debug!("字节源暂时不可读: {}", e);
                return Step::NoDataRetry;
            }
            Err(e) => {
                error!("读取字节源失败: {}", e);
                return Step::Fatal(FatalError::Io(e.kind()));
            }
        }

        // 2. 定位帧
        let pending = stream.input.pending();
        let available = pending.len();
        let Some(offset) = decoder.locate_frame(pending, &stream.context) else {
            if stream.input.is_eos() {
                debug!("剩余 {} 字节中没有帧同步码, 流结束", available);
                return Step::Done;
            }
            debug!("{} 字节中没有帧同步码, 全部丢弃", available);
            stream.input.clear();
            stats.bytes_skipped += available as u64;
            return Step::NoDataRetry;
        };

        // 3. 输出容量检查
        let required = stream.params.output_block_bytes();
        if required > output.capacity() {
            error!(
                "输出块 {} 字节超过输出缓冲区容量 {} 字节",
                required,
                output.capacity(),
            );
            return Step::Fatal(FatalError::Sizing {
                required,
                capacity: output.capacity(),
            });
        }

        // 4. 解码
        stream.context.frame_size = 0;
        let result = decoder.decode_frame(
            &mut stream.context,
            &pending[offset..],
            output.as_mut_slice(),
        );
        match result {
            Ok(decoded) => {
                let consumed = offset.saturating_add(decoded.frame_size.max(1)).min(available);
                stream.input.consume(consumed);
                if offset > 0 {
                    debug!("帧同步码前跳过 {} 字节", offset);
                    stats.bytes_skipped += offset as u64;
                }

                let sample_number = stream.context.sample_number;
                stream.context.block_size = decoded.block_size;
                stream.context.sample_number += u64::from(decoded.block_size);
                output.set_block_len(decoded.pcm_bytes);
                stats.frames_decoded += 1;

                debug!(
                    "解码帧: 采样位置 {}, {} 采样, {} 字节",
                    sample_number, decoded.block_size, consumed,
                );
                Step::Produced {
                    frame_count: decoded.block_size,
                    sample_number,
                }
            }
            Err(err)
                if err.is_truncation()
                    && !stream.input.is_eos()
                    && (offset > 0 || !stream.input.is_full()) =>
            {
                // 帧跨越了待处理字节末尾: 丢掉同步码之前的字节, 下一步强制补充
                stream.input.consume(offset);
                stats.bytes_skipped += offset as u64;
                *force_refill = true;
                debug!("帧被截断, 等待更多数据: 已有 {} 字节", available - offset);
                Step::NoDataRetry
            }
            Err(err) => {
                let skip = offset
                    .saturating_add(stream.context.frame_size.max(1))
                    .min(available);
                stream.input.consume(skip);
                stats.corrupt_frames += 1;
                stats.bytes_skipped += skip as u64;
                warn!("帧解码失败, 跳过 {} 字节重新同步: {}", skip, err);

                if stream.input.is_eos() && stream.input.unread() == 0 {
                    Step::Done
                } else {
                    Step::NoDataRetry
                }
            }
        }
    }

    /// 回到音频数据起始处重新播放
    ///
    /// 在 `Ready`, `Draining`, `Done` 状态下可用; `Probing` 状态下什么都不做.
    pub fn rewind(&mut self) -> Result<(), FatalError> {
        match &self.state {
            PipelineState::Probing => return Ok(()),
            PipelineState::Ready | PipelineState::Draining | PipelineState::Done => {}
            PipelineState::Fatal(err) => return Err(err.clone()),
            PipelineState::Closed => return Err(FatalError::Closed),
        }

        let (Some(source), Some(stream)) = (self.source.as_deref_mut(), self.stream.as_mut())
        else {
            return Err(FatalError::Closed);
        };
        if let Err(e) = source.seek(stream.data_start) {
            error!("定位到音频数据起始处失败: {}", e);
            let err = FatalError::Io(e.kind());
            self.state = PipelineState::Fatal(err.clone());
            return Err(err);
        }

        stream.input.reset();
        stream.context.reset();
        self.force_refill = false;
        self.state = PipelineState::Ready;
        debug!("重新开始播放, 数据起始 {}", stream.data_start);
        Ok(())
    }

    /// 关闭管线, 释放字节源与所有缓冲区
    ///
    /// 可重复调用, 也可用于打开失败的管线.
    pub fn close(&mut self) {
        if self.state == PipelineState::Closed {
            return;
        }
        self.source = None;
        self.stream = None;
        self.output = PcmBuffer::new();
        self.state = PipelineState::Closed;
        debug!("管线已关闭");
    }

    /// 取回输出缓冲区, 供下一条流复用
    pub fn into_output_buffer(self) -> PcmBuffer {
        self.output
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// 流参数 (打开之前为 `None`)
    pub fn params(&self) -> Option<&StreamParameters> {
        self.stream.as_ref().map(|s| &s.params)
    }

    /// 音频数据起始偏移
    pub fn data_start(&self) -> Option<u64> {
        self.stream.as_ref().map(|s| s.data_start)
    }

    pub fn context(&self) -> Option<&DecodeContext> {
        self.stream.as_ref().map(|s| &s.context)
    }

    pub fn input(&self) -> Option<&InputBuffer> {
        self.stream.as_ref().map(|s| &s.input)
    }

    pub fn output(&self) -> &PcmBuffer {
        &self.output
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }
}
