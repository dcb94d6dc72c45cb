//! liu-probe - FLAC 流信息探测与解码工具
//!
//! 打印 STREAMINFO 参数, 可选地用流式管线解码整条流, 报告帧与重新同步统计,
//! 并把解码得到的交错 PCM 写入文件.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use log::info;
use serde::Serialize;

use liu::codec::{NativeFrameDecoder, StreamParameters};
use liu::format::FileSource;
use liu::logging::{self, LoggingConfig};
use liu::{DecodePipeline, DecoderConfig, PipelineStats, StepOutcome};

/// Liu FLAC 流信息探测与解码工具
#[derive(Parser, Debug)]
#[command(name = "liu-probe", version, about = "纯 Rust 流式 FLAC 探测与解码工具")]
struct Cli {
    /// 输入文件路径
    input: PathBuf,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 解码整条流并报告统计
    #[arg(long)]
    decode: bool,

    /// 把解码得到的 PCM 写入文件 (隐含 --decode)
    #[arg(long, value_name = "FILE")]
    pcm_out: Option<PathBuf>,

    /// 解码管线配置 (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 同时把日志写入该目录
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// 日志详细程度 (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

// ============================================================
// 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    stream: StreamInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    decode: Option<DecodeSummary>,
}

/// 流信息
#[derive(Serialize)]
struct StreamInfo {
    filename: String,
    sample_rate: u32,
    channels: u32,
    output_channels: u32,
    bits_per_sample: u32,
    min_block_size: u16,
    max_block_size: u16,
    min_frame_size: u32,
    max_frame_size: u32,
    total_samples: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    data_start: u64,
    output_block_bytes: usize,
}

/// 解码统计
#[derive(Serialize)]
struct DecodeSummary {
    decoder: String,
    samples_decoded: u64,
    pcm_bytes: u64,
    retries: u64,
    elapsed_ms: u128,
    pipeline: PipelineStats,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = load_config(cli.config.as_deref())?;
    let source = FileSource::open(&cli.input)
        .with_context(|| format!("无法打开文件 '{}'", cli.input.display()))?;
    let mut pipeline = DecodePipeline::open_with(
        Box::new(source),
        Box::new(NativeFrameDecoder::new()),
        config,
    )
    .with_context(|| format!("无法解析 FLAC 流头部 '{}'", cli.input.display()))?;

    let params = *pipeline.params().context("流参数缺失")?;
    let stream = build_stream_info(&cli.input, &params, pipeline.data_start().unwrap_or(0));

    let decode = if cli.decode || cli.pcm_out.is_some() {
        Some(decode_all(&mut pipeline, cli.pcm_out.as_deref())?)
    } else {
        None
    };
    pipeline.close();

    let output = ProbeOutput { stream, decode };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    match &cli.log_dir {
        Some(dir) => {
            let level = match cli.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            logging::init(&LoggingConfig {
                level: level.to_string(),
                directory: dir.to_string_lossy().to_string(),
                file_prefix: "liu-probe".to_string(),
                console_level: "warn".to_string(),
                retention_days: 30,
                compress_history: true,
            })
        }
        None => logging::init_console(cli.verbose),
    }
}

fn load_config(path: Option<&Path>) -> Result<DecoderConfig> {
    let Some(path) = path else {
        return Ok(DecoderConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败 '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析配置文件失败 '{}'", path.display()))
}

fn build_stream_info(path: &Path, params: &StreamParameters, data_start: u64) -> StreamInfo {
    StreamInfo {
        filename: path.display().to_string(),
        sample_rate: params.sample_rate,
        channels: params.channels,
        output_channels: params.output_channels(),
        bits_per_sample: params.bits_per_sample,
        min_block_size: params.min_block_size,
        max_block_size: params.max_block_size,
        min_frame_size: params.min_frame_size,
        max_frame_size: params.max_frame_size,
        total_samples: params.total_samples,
        duration: params.duration_secs(),
        data_start,
        output_block_bytes: params.output_block_bytes(),
    }
}

/// 解码整条流, 可选写出 PCM
fn decode_all(pipeline: &mut DecodePipeline, pcm_out: Option<&Path>) -> Result<DecodeSummary> {
    let mut writer = match pcm_out {
        Some(path) => Some(BufWriter::new(
            File::create(path)
                .with_context(|| format!("创建 PCM 输出文件失败 '{}'", path.display()))?,
        )),
        None => None,
    };

    let start = Instant::now();
    let mut samples_decoded = 0u64;
    let mut pcm_bytes = 0u64;
    let mut retries = 0u64;
    loop {
        match pipeline.step() {
            StepOutcome::Produced(block) => {
                samples_decoded += u64::from(block.frame_count);
                pcm_bytes += block.data.len() as u64;
                if let Some(w) = writer.as_mut() {
                    w.write_all(block.data).context("写入 PCM 失败")?;
                }
            }
            StepOutcome::NoDataRetry => retries += 1,
            StepOutcome::Done => break,
            StepOutcome::Fatal(err) => bail!("解码失败: {}", err),
        }
    }
    if let Some(mut w) = writer {
        w.flush().context("写入 PCM 失败")?;
    }

    let summary = DecodeSummary {
        decoder: pipeline.decoder_name().to_string(),
        samples_decoded,
        pcm_bytes,
        retries,
        elapsed_ms: start.elapsed().as_millis(),
        pipeline: pipeline.stats(),
    };
    info!(
        "解码完成: {} 采样, {} 帧, 跳过 {} 个损坏帧, 耗时 {} ms",
        summary.samples_decoded,
        summary.pipeline.frames_decoded,
        summary.pipeline.corrupt_frames,
        summary.elapsed_ms,
    );
    Ok(summary)
}

fn print_text(output: &ProbeOutput) {
    let s = &output.stream;
    println!("[STREAM]");
    println!("filename={}", s.filename);
    println!("sample_rate={}", s.sample_rate);
    println!("channels={}", s.channels);
    println!("output_channels={}", s.output_channels);
    println!("bits_per_sample={}", s.bits_per_sample);
    println!("block_size={}-{}", s.min_block_size, s.max_block_size);
    println!("frame_size={}-{}", s.min_frame_size, s.max_frame_size);
    println!("total_samples={}", s.total_samples);
    if let Some(duration) = s.duration {
        println!("duration={duration:.6}");
    }
    println!("data_start={}", s.data_start);
    println!("output_block_bytes={}", s.output_block_bytes);
    println!("[/STREAM]");

    if let Some(d) = &output.decode {
        println!("[DECODE]");
        println!("decoder={}", d.decoder);
        println!("samples_decoded={}", d.samples_decoded);
        println!("pcm_bytes={}", d.pcm_bytes);
        println!("frames_decoded={}", d.pipeline.frames_decoded);
        println!("corrupt_frames={}", d.pipeline.corrupt_frames);
        println!("bytes_skipped={}", d.pipeline.bytes_skipped);
        println!("refills={}", d.pipeline.refills);
        println!("bytes_read={}", d.pipeline.bytes_read);
        println!("retries={}", d.retries);
        println!("elapsed_ms={}", d.elapsed_ms);
        println!("[/DECODE]");
    }
}
