//! BBFS 磁盘数据结构定义
//!
//! 这个模块包含直接对应磁盘格式的数据结构及其编解码。
//!
//! ## 设计原则
//!
//! 1. **磁盘格式为大端** - 所有多字节字段通过 `byteorder::BigEndian` 编解码
//! 2. **不做内存映射** - 解析为普通 Rust 结构体，避免 `repr(C)` 强转
//! 3. **段即一个物理块** - `Segment` 序列化后恰好等于 `NAND_BLOCK_SIZE`

use alloc::vec;
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};

/// Superblock 段的 footer
///
/// 位于段的最后 12 字节。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// 魔数：主段为 "BBFS"，链接段为 "BBFL"
    pub magic: [u8; 4],
    /// 序列号，越大越新
    pub seqno: u32,
    /// 配对段所在的物理块号（无配对段时为 0）
    pub link: u16,
    /// 校验和（使段内 16 位字之和等于 `BBFS_CHECKSUM`）
    pub checksum: u16,
}

impl Footer {
    /// 从 12 字节缓冲区解析 footer
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < BBFS_FOOTER_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Footer buffer too small"));
        }
        Ok(Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            seqno: BigEndian::read_u32(&buf[4..8]),
            link: BigEndian::read_u16(&buf[8..10]),
            checksum: BigEndian::read_u16(&buf[10..12]),
        })
    }

    /// 将 footer 序列化到 12 字节缓冲区
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.magic);
        BigEndian::write_u32(&mut buf[4..8], self.seqno);
        BigEndian::write_u16(&mut buf[8..10], self.link);
        BigEndian::write_u16(&mut buf[10..12], self.checksum);
    }
}

/// 文件表项（磁盘上 20 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    /// 文件名（不足 8 字节时以 0 填充）
    pub name: [u8; 8],
    /// 扩展名（不足 3 字节时以 0 填充）
    pub ext: [u8; 3],
    /// 有效标志（非 0 表示有效）
    pub valid: u8,
    /// 首块指针（空文件为 `FAT_TERMINATOR`）
    pub block: i16,
    /// 填充字段，保留磁盘上的原始内容
    pub pad: u16,
    /// 文件大小（字节）
    pub size: u32,
}

impl FileEntry {
    /// 无效的空表项
    pub const fn empty() -> Self {
        Self {
            name: [0; 8],
            ext: [0; 3],
            valid: 0,
            block: FAT_TERMINATOR,
            pad: 0,
            size: 0,
        }
    }

    /// 表项是否有效
    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    /// 文件名 + 扩展名的原始 11 字节（fsck 的哈希输入）
    pub fn raw_name(&self) -> [u8; 11] {
        let mut raw = [0u8; 11];
        raw[..8].copy_from_slice(&self.name);
        raw[8..].copy_from_slice(&self.ext);
        raw
    }

    /// 从 20 字节缓冲区解析表项
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < BBFS_ENTRY_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Entry buffer too small"));
        }
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name.copy_from_slice(&buf[0..8]);
        ext.copy_from_slice(&buf[8..11]);
        Ok(Self {
            name,
            ext,
            valid: buf[11],
            block: BigEndian::read_i16(&buf[12..14]),
            pad: BigEndian::read_u16(&buf[14..16]),
            size: BigEndian::read_u32(&buf[16..20]),
        })
    }

    /// 将表项序列化到 20 字节缓冲区
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.name);
        buf[8..11].copy_from_slice(&self.ext);
        buf[11] = self.valid;
        BigEndian::write_i16(&mut buf[12..14], self.block);
        BigEndian::write_u16(&mut buf[14..16], self.pad);
        BigEndian::write_u32(&mut buf[16..20], self.size);
    }
}

/// Superblock 段的内存镜像
///
/// 对应磁盘上的一个物理块：分配表 + 文件表 + footer。
/// 只有主段（段 0）的文件表是权威数据；链接段的文件表区域
/// 原样保留，保证重新序列化后与读入的镜像一致。
#[derive(Debug, Clone)]
pub struct Segment {
    /// 分配表（4096 项）
    pub fat: Vec<i16>,
    /// 文件表（409 项）
    pub entries: Vec<FileEntry>,
    /// Footer
    pub footer: Footer,
}

impl Segment {
    /// 创建一个空段
    pub fn new(magic: [u8; 4]) -> Self {
        Self {
            fat: vec![FAT_UNUSED; BBFS_FAT_ENTRIES],
            entries: vec![FileEntry::empty(); BBFS_MAX_ENTRIES],
            footer: Footer {
                magic,
                seqno: 0,
                link: 0,
                checksum: 0,
            },
        }
    }

    /// 从一个完整的块镜像解析段
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != NAND_BLOCK_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Segment image size mismatch"));
        }
        let mut fat = Vec::with_capacity(BBFS_FAT_ENTRIES);
        for i in 0..BBFS_FAT_ENTRIES {
            fat.push(BigEndian::read_i16(&buf[i * 2..i * 2 + 2]));
        }
        let mut entries = Vec::with_capacity(BBFS_MAX_ENTRIES);
        for i in 0..BBFS_MAX_ENTRIES {
            let off = BBFS_ENTRIES_OFFSET + i * BBFS_ENTRY_SIZE;
            entries.push(FileEntry::parse(&buf[off..off + BBFS_ENTRY_SIZE])?);
        }
        let footer = Footer::parse(&buf[BBFS_FOOTER_OFFSET..])?;
        Ok(Self { fat, entries, footer })
    }

    /// 将段序列化为一个完整的块镜像
    pub fn to_image(&self) -> Vec<u8> {
        let mut buf = vec![0u8; NAND_BLOCK_SIZE];
        for (i, &v) in self.fat.iter().enumerate() {
            BigEndian::write_i16(&mut buf[i * 2..i * 2 + 2], v);
        }
        for (i, entry) in self.entries.iter().enumerate() {
            let off = BBFS_ENTRIES_OFFSET + i * BBFS_ENTRY_SIZE;
            entry.write_to(&mut buf[off..off + BBFS_ENTRY_SIZE]);
        }
        self.footer.write_to(&mut buf[BBFS_FOOTER_OFFSET..]);
        buf
    }
}
