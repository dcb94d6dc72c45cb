//! 比特流读取器.
//!
//! 从帧字节片段中按位读取数据, FLAC 帧头与子帧解码都依赖它.
//!
//! 按大端位序读取 (MSB first). 所有越界读取都返回 [`LiuError::Eof`],
//! 帧解码器据此判断帧是否被截断在输入缓冲区末尾.

use crate::{LiuError, LiuResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use liu_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> LiuResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(LiuError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 N 个位 (最多 32 位), 返回值的低 N 位有效
    pub fn read_bits(&mut self, n: u32) -> LiuResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(LiuError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(LiuError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - u32::from(self.bit_pos);
            let to_read = remaining.min(available);

            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取有符号整数 (二进制补码)
    pub fn read_bits_signed(&mut self, n: u32) -> LiuResult<i32> {
        let val = self.read_bits(n)?;
        if n == 0 {
            return Ok(0);
        }
        if n >= 32 {
            return Ok(val as i32);
        }
        // 符号扩展
        if (val >> (n - 1)) & 1 != 0 {
            Ok(val as i32 | !((1i32 << n) - 1))
        } else {
            Ok(val as i32)
        }
    }

    /// 读取一元编码值: 统计遇到 1 之前的 0 的个数
    ///
    /// 例如从 `0001...` 中读取得到 3.
    pub fn read_unary(&mut self) -> LiuResult<u32> {
        let mut count = 0u32;
        loop {
            // 当前字节剩余部分全为 0 时整段跳过
            if self.bit_pos == 0
                && self.byte_pos < self.data.len()
                && self.data[self.byte_pos] == 0
            {
                self.byte_pos += 1;
                count = count.saturating_add(8);
                continue;
            }
            if self.read_bit()? == 1 {
                return Ok(count);
            }
            count = count.saturating_add(1);
        }
    }

    /// 读取 FLAC 的 "UTF-8" 变长整数 (帧号或采样号, 最多 36 位)
    pub fn read_utf8_u64(&mut self) -> LiuResult<u64> {
        let first = self.read_bits(8)? as u8;

        let (value, extra_bytes) = match utf8_sequence_len(first) {
            Some(1) => (u64::from(first), 0),
            Some(len) => (u64::from(first & (0x7F_u8 >> len)), len - 1),
            _ => {
                return Err(LiuError::InvalidData(format!(
                    "无效的 UTF-8 变长编码首字节: 0x{:02X}",
                    first,
                )));
            }
        };

        let mut result = value;
        for _ in 0..extra_bytes {
            let byte = self.read_bits(8)? as u8;
            if byte & 0xC0 != 0x80 {
                return Err(LiuError::InvalidData(
                    "无效的 UTF-8 变长编码后续字节".into(),
                ));
            }
            result = (result << 6) | u64::from(byte & 0x3F);
        }

        Ok(result)
    }

    /// 对齐到下一个字节边界, 已对齐时不做任何事
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}

/// 根据首字节计算 FLAC "UTF-8" 编码的总字节数 (1-7)
///
/// 首字节本身是后续字节 (`10xxxxxx`) 或 `0xFF` 时返回 `None`.
pub fn utf8_sequence_len(first: u8) -> Option<usize> {
    match first.leading_ones() {
        0 => Some(1),
        1 | 8 => None,
        n => Some(n as usize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(1).unwrap(), 0);
        assert_eq!(br.read_bits(2).unwrap(), 0b11);
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);

        assert_eq!(br.bits_left(), 0);
    }

    #[test]
    fn test_read_bits_32_bit() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0xFF00FF00);
    }

    #[test]
    fn test_read_bits_signed() {
        let data = [0b11111000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_signed(5).unwrap(), -1);

        let data2 = [0b01010000];
        let mut br2 = BitReader::new(&data2);
        assert_eq!(br2.read_bits_signed(5).unwrap(), 10);
    }

    #[test]
    fn test_read_unary_跨字节() {
        // 11 个 0 后跟一个 1
        let data = [0x00, 0b00010000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_unary().unwrap(), 11);
        assert_eq!(br.bits_left(), 4);
    }

    #[test]
    fn test_read_unary_全零返回_eof() {
        let data = [0x00, 0x00];
        let mut br = BitReader::new(&data);
        assert!(matches!(br.read_unary(), Err(LiuError::Eof)));
    }

    #[test]
    fn test_read_utf8_u64() {
        let data = [0x42];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_utf8_u64().unwrap(), 0x42);

        // 双字节: 0xC2 0x80 = 0x80
        let data2 = [0xC2, 0x80];
        let mut br2 = BitReader::new(&data2);
        assert_eq!(br2.read_utf8_u64().unwrap(), 0x80);

        let bad = [0x80];
        let mut br3 = BitReader::new(&bad);
        assert!(br3.read_utf8_u64().is_err());
    }

    #[test]
    fn test_utf8_sequence_len() {
        assert_eq!(utf8_sequence_len(0x00), Some(1));
        assert_eq!(utf8_sequence_len(0xC0), Some(2));
        assert_eq!(utf8_sequence_len(0xFE), Some(7));
        assert_eq!(utf8_sequence_len(0x80), None);
        assert_eq!(utf8_sequence_len(0xFF), None);
    }

    #[test]
    fn test_align_to_byte() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        br.read_bits(3).unwrap();
        br.align_to_byte();
        assert_eq!(br.byte_position(), 1);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
    }

    #[test]
    fn test_eof_error() {
        let data = [0x00];
        let mut br = BitReader::new(&data);

        br.read_bits(8).unwrap();
        assert!(matches!(br.read_bits(1), Err(LiuError::Eof)));
    }
}
