//! 目录操作
//!
//! BBFS 的命名空间是平坦的 8.3 文件名：最多 8 字节文件名加
//! 最多 3 字节扩展名，存放在定长字段里，短于字段长度时以 0 填充。
//! 没有层级目录，枚举即顺序扫描文件表。

use alloc::string::String;

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::superblock::SuperblockStore;
use crate::types::FileEntry;

/// 解析后的 8.3 文件名
///
/// 查询名在最后一个 '.' 处拆分；比较时总是使用完整的零填充
/// 定长字段，避免把短名字误判为长名字的前缀。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileName {
    /// 文件名字段（零填充）
    pub name: [u8; 8],
    /// 扩展名字段（零填充）
    pub ext: [u8; 3],
}

impl FileName {
    /// 解析查询名
    ///
    /// 文件名部分不能为空且不超过 8 字节，扩展名不超过 3 字节。
    pub fn parse(path: &str) -> Result<Self> {
        let raw = path.as_bytes();
        if raw.contains(&b'/') || raw.contains(&0) {
            return Err(Error::new(ErrorKind::InvalidInput, "Invalid character in filename"));
        }
        let (name_part, ext_part) = match path.rfind('.') {
            Some(dot) => (&raw[..dot], &raw[dot + 1..]),
            None => (raw, &raw[..0]),
        };
        if name_part.is_empty() || name_part.len() > 8 || ext_part.len() > 3 {
            return Err(Error::new(ErrorKind::InvalidInput, "Filename does not fit 8.3"));
        }
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name[..name_part.len()].copy_from_slice(name_part);
        ext[..ext_part.len()].copy_from_slice(ext_part);
        Ok(Self { name, ext })
    }

    /// 与文件表项逐字节比较
    pub fn matches(&self, entry: &FileEntry) -> bool {
        entry.name == self.name && entry.ext == self.ext
    }
}

/// 把文件表项重建为 "NAME.EXT" 形式的显示名
///
/// 去掉每个字段的尾部填充；分隔符 '.' 始终保留（与原始固件的
/// 目录列举格式一致，无扩展名的文件显示为 "NAME."）。
pub fn display_name(entry: &FileEntry) -> String {
    let mut out = String::with_capacity(12);
    for &b in entry.name.iter().take_while(|&&b| b != 0) {
        out.push(b as char);
    }
    out.push('.');
    for &b in entry.ext.iter().take_while(|&&b| b != 0) {
        out.push(b as char);
    }
    out
}

/// 按名字查找有效表项，返回表项索引
pub(crate) fn find_entry(store: &SuperblockStore, name: &FileName) -> Option<usize> {
    (0..BBFS_MAX_ENTRIES)
        .find(|&i| store.entry(i).is_valid() && name.matches(store.entry(i)))
}

/// 查找第一个空闲（无效）表项
pub(crate) fn find_free_entry(store: &SuperblockStore) -> Option<usize> {
    (0..BBFS_MAX_ENTRIES).find(|&i| !store.entry(i).is_valid())
}

/// 目录枚举游标
///
/// 游标是文件表的下标；每次取下一个有效表项。
#[derive(Debug, Clone)]
pub struct Dir {
    cursor: usize,
}

/// 枚举产出的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 显示名（"NAME.EXT"）
    pub name: String,
    /// 文件大小（字节）
    pub size: u32,
    /// 文件表下标（即 inode 号）
    pub index: u16,
}

impl Dir {
    /// 打开根目录
    ///
    /// BBFS 没有子目录，只接受 "/"。
    pub fn open(path: &str) -> Result<Self> {
        if path != "/" {
            return Err(Error::new(ErrorKind::NotFound, "Only the root directory exists"));
        }
        Ok(Self { cursor: 0 })
    }

    /// 取下一个有效表项
    pub(crate) fn next_entry(&mut self, store: &SuperblockStore) -> Option<DirEntry> {
        while self.cursor < BBFS_MAX_ENTRIES {
            let idx = self.cursor;
            self.cursor += 1;
            let entry = store.entry(idx);
            if entry.is_valid() {
                return Some(DirEntry {
                    name: display_name(entry),
                    size: entry.size,
                    index: idx as u16,
                });
            }
        }
        None
    }
}
