//! 文件系统高级 API
//!
//! [`Bbfs`] 是一个显式的文件系统上下文：设备、随机源、superblock
//! 镜像和小文件区域状态都归它所有，没有任何进程级全局量，多个
//! 实例可以并存（测试时尤其有用）。
//!
//! 执行模型是单线程同步的；多线程使用需要调用方在外部加锁。

use alloc::vec::Vec;

use crate::balloc::SmallArea;
use crate::consts::*;
use crate::dir::{self, Dir, DirEntry, FileName};
use crate::error::{Error, ErrorKind, Result};
use crate::file::{File, OpenFlags, SeekFrom};
use crate::fsck;
use crate::nand::NandDevice;
use crate::rand::Rng;
use crate::superblock::{self, SlotRef, SuperblockStore};
use crate::types::FileEntry;

/// stat 返回的文件元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// 文件大小（字节）
    pub size: u32,
    /// inode 号（文件表下标）
    pub inode: u16,
    /// 块大小（字节）
    pub block_size: u32,
    /// 占用的块数
    pub blocks: u32,
}

/// BBFS 文件系统实例
pub struct Bbfs<D: NandDevice, R: Rng> {
    pub(crate) dev: D,
    pub(crate) rng: R,
    pub(crate) store: SuperblockStore,
    pub(crate) area: SmallArea,
}

impl<D: NandDevice, R: Rng> Bbfs<D, R> {
    /// 挂载设备
    ///
    /// 扫描保留区并装载最新的有效 superblock；失败时文件系统
    /// 不可用（`ErrorKind::Superblock`）。
    pub fn mount(mut dev: D, rng: R) -> Result<Self> {
        let store = superblock::mount_store(&mut dev)?;
        let area = SmallArea::init(&store);
        Ok(Self { dev, rng, store, area })
    }

    /// 卸载，收回设备
    ///
    /// 先把未持久化的修改写成新的一代。
    pub fn unmount(mut self) -> Result<D> {
        self.checkpoint()?;
        Ok(self.dev)
    }

    /// 设备总块数
    pub fn total_blocks(&self) -> usize {
        self.store.total_blocks()
    }

    /// 显式持久化点：把脏的 superblock 写成新的一代
    pub fn checkpoint(&mut self) -> Result<()> {
        self.store.flush(&mut self.dev, &mut self.rng)
    }

    /// 打开文件
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<File> {
        if !flags.intersects(OpenFlags::READ | OpenFlags::WRITE) {
            return Err(Error::new(ErrorKind::InvalidInput, "Open mode must allow read or write"));
        }
        let name = FileName::parse(path)?;

        let idx = match dir::find_entry(&self.store, &name) {
            Some(idx) => {
                if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                    return Err(Error::new(ErrorKind::AlreadyExists, "File already exists"));
                }
                idx
            }
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(Error::new(ErrorKind::NotFound, "File not found"));
                }
                let idx = dir::find_free_entry(&self.store)
                    .ok_or(Error::new(ErrorKind::NoSpace, "File table is full"))?;
                let mut entry = FileEntry::empty();
                entry.name = name.name;
                entry.ext = name.ext;
                entry.valid = 1;
                self.store.put_entry(idx, entry);
                log::debug!("[FS] created {:?} at entry {}", path, idx);
                idx
            }
        };

        if flags.contains(OpenFlags::TRUNC) {
            self.shrink_entry(idx, 0)?;
        }

        let mut file = File::new(idx as u16, self.store.entry(idx).block, flags);
        if flags.contains(OpenFlags::APPEND) {
            file.seek(self, 0, SeekFrom::End)?;
        }
        Ok(file)
    }

    /// 删除文件
    ///
    /// 释放整条块链、使表项无效，然后持久化。
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let name = FileName::parse(path)?;
        let idx = dir::find_entry(&self.store, &name)
            .ok_or(Error::new(ErrorKind::NotFound, "File not found"))?;
        self.shrink_entry(idx, 0)?;
        self.store.set_entry_valid(idx, false);
        self.checkpoint()
    }

    /// 查询文件元信息
    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let name = FileName::parse(path)?;
        let idx = dir::find_entry(&self.store, &name)
            .ok_or(Error::new(ErrorKind::NotFound, "File not found"))?;
        Ok(self.stat_entry(idx))
    }

    pub(crate) fn stat_entry(&self, idx: usize) -> FileStat {
        let entry = self.store.entry(idx);
        FileStat {
            size: entry.size,
            inode: idx as u16,
            block_size: NAND_BLOCK_SIZE as u32,
            blocks: (entry.size + NAND_BLOCK_SIZE as u32 - 1) / NAND_BLOCK_SIZE as u32,
        }
    }

    /// 打开根目录枚举
    pub fn open_dir(&self, path: &str) -> Result<Dir> {
        Dir::open(path)
    }

    /// 取目录中的下一个文件
    pub fn read_dir(&self, dir: &mut Dir) -> Option<DirEntry> {
        dir.next_entry(&self.store)
    }

    /// 诊断辅助：返回文件完整有序的块链
    pub fn file_blocks(&self, path: &str) -> Result<Vec<i16>> {
        let name = FileName::parse(path)?;
        let idx = dir::find_entry(&self.store, &name)
            .ok_or(Error::new(ErrorKind::NotFound, "File not found"))?;
        let entry = self.store.entry(idx);
        let num_blocks =
            (entry.size as usize + NAND_BLOCK_SIZE - 1) / NAND_BLOCK_SIZE;

        let mut blocks = Vec::with_capacity(num_blocks);
        let mut link = entry.block;
        for _ in 0..num_blocks {
            let block = self.store.checked_block(link)?;
            blocks.push(link);
            link = self.store.fat_get(block);
        }
        Ok(blocks)
    }

    /// 离线一致性检查
    ///
    /// 发现的问题通过 `report(消息, 是否可修复)` 回调逐条报告；
    /// `fix_errors` 为真时就地修复可修复的问题。返回是否没有
    /// 遗留不可修复的问题。结束时总是持久化（可能应用了修复）。
    pub fn fsck(
        &mut self,
        fix_errors: bool,
        report: Option<&mut dyn FnMut(&str, bool)>,
    ) -> Result<bool> {
        let clean = fsck::run(&mut self.store, fix_errors, report)?;
        // 修复可能释放了块，区域状态按修复后的分配表重建
        self.area = SmallArea::init(&self.store);
        self.checkpoint()?;
        Ok(clean)
    }

    /// 把文件截到 `len` 字节并释放后续所有块
    pub(crate) fn shrink_entry(&mut self, idx: usize, len: u32) -> Result<()> {
        // 走到将成为新链尾的块
        let mut slot = SlotRef::Entry(idx as u16);
        let mut walked = 0u64;
        while walked < len as u64 {
            let block = self.store.checked_block(self.store.read_slot(slot))?;
            slot = SlotRef::Fat(block as u16);
            walked += NAND_BLOCK_SIZE as u64;
        }

        // 在这里剪断，然后释放剩下的链
        let mut link = self.store.read_slot(slot);
        if link != FAT_TERMINATOR {
            self.store.write_slot(slot, FAT_TERMINATOR);
        }
        while link != FAT_TERMINATOR {
            let block = self.store.checked_block(link)?;
            link = self.store.fat_get(block);
            self.store.fat_set(block, FAT_UNUSED);
            self.area.note_freed(block);
        }

        if self.store.entry(idx).size != len {
            self.store.set_entry_size(idx, len);
        }
        Ok(())
    }
}
