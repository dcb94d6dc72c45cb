//! 字节源抽象.
//!
//! 解码管线只需要 "读 N 个字节" 与 "定位到绝对偏移" 两个能力.
//! 读到流末尾不是错误: 读取返回 0 字节后 [`ByteSource::is_eof`] 为真,
//! 定位之后重新清除.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// 字节源 trait
///
/// 实现此 trait 以支持不同的数据来源 (文件、内存、任意 `Read + Seek`).
pub trait ByteSource: Send {
    /// 读取数据到缓冲区, 返回实际读取的字节数
    ///
    /// 返回 0 (且 `buf` 非空) 表示已到达流末尾.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// 定位到绝对偏移, 返回新位置
    fn seek(&mut self, offset: u64) -> io::Result<u64>;

    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;

    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;

    /// 最近一次读取是否遇到流末尾
    fn is_eof(&self) -> bool;

    /// 向前跳过指定字节数
    fn skip(&mut self, count: u64) -> io::Result<u64> {
        let pos = self.position()?;
        let target = pos.checked_add(count).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "skip 目标偏移溢出")
        })?;
        self.seek(target)
    }

    /// 尽量读满缓冲区, 只有到达流末尾时才返回更少的字节
    ///
    /// `Interrupted` 会自动重试, 其他错误原样返回.
    fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        (**self).seek(offset)
    }

    fn position(&mut self) -> io::Result<u64> {
        (**self).position()
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }

    fn is_eof(&self) -> bool {
        (**self).is_eof()
    }
}

/// 文件字节源
pub struct FileSource {
    file: File,
    size: Option<u64>,
    eof: bool,
}

impl FileSource {
    /// 以只读方式打开文件
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }

    /// 包装已打开的文件
    pub fn new(file: File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self {
            file,
            size,
            eof: false,
        }
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.eof = false;
        self.file.seek(SeekFrom::Start(offset))
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// 任意 `Read + Seek` 的字节源
///
/// 用于 `Cursor`、解压流等不是文件的来源.
pub struct ReaderSource<R> {
    inner: R,
    eof: bool,
}

impl<R: Read + Seek + Send> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, eof: false }
    }
}

impl<R: Read + Seek + Send> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.eof = false;
        self.inner.seek(SeekFrom::Start(offset))
    }

    fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// 内存字节源
///
/// 用于测试和已完整载入内存的流.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    /// 数据
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
    eof: bool,
}

impl MemorySource {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            eof: false,
        }
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            if !buf.is_empty() {
                self.eof = true;
            }
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        let pos = usize::try_from(offset).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek 位置超出地址空间")
        })?;
        self.pos = pos;
        self.eof = false;
        Ok(offset)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_内存源读到末尾() {
        let mut src = MemorySource::from_data(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert!(!src.is_eof());
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert!(!src.is_eof());
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        assert!(src.is_eof());
    }

    #[test]
    fn test_定位清除末尾标志() {
        let mut src = MemorySource::from_data(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(src.read_fully(&mut buf).unwrap(), 3);
        assert!(src.is_eof());

        src.seek(1).unwrap();
        assert!(!src.is_eof());
        assert_eq!(src.position().unwrap(), 1);
        assert_eq!(src.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn test_跳过() {
        let mut src = MemorySource::from_data((0u8..10).collect());
        src.skip(4).unwrap();
        let mut buf = [0u8; 2];
        src.read(&mut buf).unwrap();
        assert_eq!(buf, [4, 5]);
    }

    #[test]
    fn test_文件源() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fLaC-data").unwrap();
        file.flush().unwrap();

        let mut src = FileSource::open(file.path()).unwrap();
        assert_eq!(src.size(), Some(9));
        let mut buf = [0u8; 16];
        assert_eq!(src.read_fully(&mut buf).unwrap(), 9);
        assert_eq!(&buf[..4], b"fLaC");
        assert!(src.is_eof());

        src.seek(4).unwrap();
        assert!(!src.is_eof());
        assert_eq!(src.read_fully(&mut buf).unwrap(), 5);
    }

    #[test]
    fn test_reader_源() {
        let mut src = ReaderSource::new(Cursor::new(vec![9u8; 6]));
        let mut buf = [0u8; 4];
        assert_eq!(src.read_fully(&mut buf).unwrap(), 4);
        assert_eq!(src.read_fully(&mut buf).unwrap(), 2);
        assert!(src.is_eof());
        assert_eq!(src.position().unwrap(), 6);
        assert_eq!(src.size(), None);
    }
}
