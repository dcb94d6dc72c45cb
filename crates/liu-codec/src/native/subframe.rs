//! FLAC 子帧解码.
//!
//! 子帧直接解码进调用方提供的采样区 (解码上下文的声道累积区), 不做逐帧分配.
//! 预测在原地完成: 残差先写入采样区, 再按顺序加上预测值.

use liu_core::{BitReader, LiuError, LiuResult};

/// LPC 最大阶数
const MAX_LPC_ORDER: usize = 32;

/// 子帧类型
#[derive(Debug, Clone, Copy)]
enum SubframeType {
    /// 常量: 所有采样相同
    Constant,
    /// 原始: 未压缩
    Verbatim,
    /// 固定预测 (阶数 0-4)
    Fixed(usize),
    /// LPC 预测 (阶数 1-32)
    Lpc(usize),
}

impl SubframeType {
    fn from_code(code: u32) -> LiuResult<Self> {
        match code {
            0 => Ok(Self::Constant),
            1 => Ok(Self::Verbatim),
            8..=12 => Ok(Self::Fixed((code - 8) as usize)),
            32..=63 => Ok(Self::Lpc((code - 31) as usize)),
            _ => Err(LiuError::InvalidData(format!(
                "FLAC 保留的子帧类型: {}",
                code,
            ))),
        }
    }
}

/// 解码一个子帧到 `out` (长度等于块大小)
pub(crate) fn decode_subframe(br: &mut BitReader<'_>, out: &mut [i32], bps: u32) -> LiuResult<()> {
    // 子帧头: padding (1 bit) + type (6 bits) + wasted bits flag (1 bit)
    if br.read_bits(1)? != 0 {
        return Err(LiuError::InvalidData("FLAC 子帧填充位非 0".into()));
    }
    let subframe_type = SubframeType::from_code(br.read_bits(6)?)?;
    let wasted_bits = if br.read_bits(1)? != 0 {
        br.read_unary()? + 1
    } else {
        0
    };
    if wasted_bits >= bps {
        return Err(LiuError::InvalidData(format!(
            "wasted bits {} 不小于位深 {}",
            wasted_bits, bps,
        )));
    }
    let bps = bps - wasted_bits;
    if bps > 32 {
        return Err(LiuError::Unsupported(format!("子帧位深 {} 超过 32 位", bps)));
    }

    match subframe_type {
        SubframeType::Constant => {
            let value = br.read_bits_signed(bps)?;
            out.fill(value);
        }
        SubframeType::Verbatim => {
            for sample in out.iter_mut() {
                *sample = br.read_bits_signed(bps)?;
            }
        }
        SubframeType::Fixed(order) => decode_fixed(br, out, bps, order)?,
        SubframeType::Lpc(order) => decode_lpc(br, out, bps, order)?,
    }

    if wasted_bits > 0 {
        for sample in out.iter_mut() {
            *sample = sample.wrapping_shl(wasted_bits);
        }
    }

    Ok(())
}

fn read_warmup(br: &mut BitReader<'_>, out: &mut [i32], bps: u32, order: usize) -> LiuResult<()> {
    if order > out.len() {
        return Err(LiuError::InvalidData(format!(
            "预测阶数 {} 大于块大小 {}",
            order,
            out.len(),
        )));
    }
    for sample in &mut out[..order] {
        *sample = br.read_bits_signed(bps)?;
    }
    Ok(())
}

/// 解码 Fixed 预测子帧
fn decode_fixed(br: &mut BitReader<'_>, out: &mut [i32], bps: u32, order: usize) -> LiuResult<()> {
    read_warmup(br, out, bps, order)?;
    decode_residual(br, out, order)?;

    for i in order..out.len() {
        let predicted: i64 = match order {
            0 => 0,
            1 => i64::from(out[i - 1]),
            2 => 2 * i64::from(out[i - 1]) - i64::from(out[i - 2]),
            3 => {
                3 * i64::from(out[i - 1]) - 3 * i64::from(out[i - 2]) + i64::from(out[i - 3])
            }
            _ => {
                4 * i64::from(out[i - 1]) - 6 * i64::from(out[i - 2]) + 4 * i64::from(out[i - 3])
                    - i64::from(out[i - 4])
            }
        };
        out[i] = (predicted + i64::from(out[i])) as i32;
    }

    Ok(())
}

/// 解码 LPC 预测子帧
fn decode_lpc(br: &mut BitReader<'_>, out: &mut [i32], bps: u32, order: usize) -> LiuResult<()> {
    read_warmup(br, out, bps, order)?;

    let precision = br.read_bits(4)? + 1;
    if precision > 15 {
        return Err(LiuError::InvalidData("无效的 LPC 精度编码".into()));
    }
    let shift = br.read_bits_signed(5)?;
    if shift < 0 {
        return Err(LiuError::InvalidData(format!("LPC 移位量为负: {}", shift)));
    }

    let mut coefficients = [0i64; MAX_LPC_ORDER];
    for coeff in &mut coefficients[..order] {
        *coeff = i64::from(br.read_bits_signed(precision)?);
    }

    decode_residual(br, out, order)?;

    for i in order..out.len() {
        let predicted: i64 = coefficients[..order]
            .iter()
            .enumerate()
            .map(|(j, &c)| c * i64::from(out[i - 1 - j]))
            .sum();
        out[i] = ((predicted >> shift) + i64::from(out[i])) as i32;
    }

    Ok(())
}

/// 解码 Rice 残差到 `out[order..]`
fn decode_residual(br: &mut BitReader<'_>, out: &mut [i32], order: usize) -> LiuResult<()> {
    let coding_method = br.read_bits(2)?;
    let (param_bits, escape_code) = match coding_method {
        0 => (4, 15),  // RICE_PARTITION
        1 => (5, 31),  // RICE2_PARTITION
        _ => {
            return Err(LiuError::InvalidData(format!(
                "无效的残差编码方式: {}",
                coding_method,
            )));
        }
    };

    let partition_order = br.read_bits(4)?;
    let block_size = out.len();
    let partitions = 1usize << partition_order;
    if block_size % partitions != 0 || (block_size >> partition_order) < order {
        return Err(LiuError::InvalidData(format!(
            "残差分区阶数 {} 与块大小 {} 不匹配",
            partition_order, block_size,
        )));
    }
    let partition_len = block_size >> partition_order;

    let mut pos = order;
    for partition in 0..partitions {
        let count = if partition == 0 {
            partition_len - order
        } else {
            partition_len
        };
        let target = &mut out[pos..pos + count];
        pos += count;

        let rice_param = br.read_bits(param_bits)?;
        if rice_param == escape_code {
            let bits = br.read_bits(5)?;
            for residual in target.iter_mut() {
                *residual = br.read_bits_signed(bits)?;
            }
            continue;
        }

        for residual in target.iter_mut() {
            let quotient = u64::from(br.read_unary()?);
            let remainder = u64::from(br.read_bits(rice_param)?);
            let folded = (quotient << rice_param) | remainder;
            if folded > u64::from(u32::MAX) {
                return Err(LiuError::InvalidData("Rice 残差溢出".into()));
            }
            // 折叠映射: 0->0, 1->-1, 2->1, 3->-2, ...
            let folded = folded as u32;
            *residual = ((folded >> 1) as i32) ^ -((folded & 1) as i32);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_常量子帧() {
        // 头: 0 000000 0, 值 -2 (16 位)
        let data = [0x00, 0xFF, 0xFE];
        let mut out = [0i32; 8];
        let mut br = BitReader::new(&data);
        decode_subframe(&mut br, &mut out, 16).unwrap();
        assert!(out.iter().all(|&s| s == -2));
    }

    #[test]
    fn test_原始子帧() {
        // 头: 0 000001 0 = 0x02, 4 个 8 位采样
        let data = [0x02, 0x01, 0xFF, 0x7F, 0x80];
        let mut out = [0i32; 4];
        let mut br = BitReader::new(&data);
        decode_subframe(&mut br, &mut out, 8).unwrap();
        assert_eq!(out, [1, -1, 127, -128]);
    }

    #[test]
    fn test_wasted_bits() {
        // 头: 0 000000 1 = 0x01, 一元码 "1" 表示 wasted=1, 然后 7 位常量 3
        // 位序列: 00000001 1 0000011 -> 0x01, 0b10000011
        let data = [0x01, 0b1000_0011];
        let mut out = [0i32; 4];
        let mut br = BitReader::new(&data);
        decode_subframe(&mut br, &mut out, 8).unwrap();
        assert!(out.iter().all(|&s| s == 6));
    }

    #[test]
    fn test_固定一阶预测() {
        // 头: 0 001001 0 = 0x12 (Fixed order 1)
        // warm-up 8 位: 10
        // 残差: method 00, partition order 0000, rice param 0000
        // 3 个残差 1,1,1 -> 折叠值 2 -> 一元 q=2 ("001"), k=0
        // 位: 00001010 | 00 0000 0000 001 001 001 + 填充
        let data = [0x12, 0x0A, 0b0000_0000, 0b0000_1001, 0b0010_0000];
        let mut out = [0i32; 4];
        let mut br = BitReader::new(&data);
        decode_subframe(&mut br, &mut out, 8).unwrap();
        assert_eq!(out, [10, 11, 12, 13]);
    }

    #[test]
    fn test_保留子帧类型() {
        // 类型码 2 保留: 0 000010 0 = 0x04
        let data = [0x04, 0x00];
        let mut out = [0i32; 2];
        let mut br = BitReader::new(&data);
        assert!(matches!(
            decode_subframe(&mut br, &mut out, 8),
            Err(LiuError::InvalidData(_))
        ));
    }

    #[test]
    fn test_截断返回_eof() {
        let data = [0x02, 0x01];
        let mut out = [0i32; 4];
        let mut br = BitReader::new(&data);
        assert!(matches!(
            decode_subframe(&mut br, &mut out, 8),
            Err(LiuError::Eof)
        ));
    }
}
