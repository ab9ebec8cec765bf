//! 打开文件的会话状态机
//!
//! 每个打开的文件持有：文件表下标、字节位置、当前块号、指向
//! "链接着当前块的槽位"的 [`SlotRef`]、一页大小的写缓存，以及
//! 五个状态标志。标志只能按 [`write`](crate::file) 与本模块中
//! 的转移规则变化，这构成影子写协议的崩溃安全性：
//!
//! - 写入过程中块从不被原地修改，新数据进入一个未入链的影子块；
//! - 只有写完一个块（到达块尾、seek 离开或关闭）才把影子块拼接
//!   进分配表，旧块同时释放；
//! - 在拼接之前，磁盘上的链只包含原有的有效块，断电最多丢失
//!   未落盘的本块字节，绝不破坏链。

mod read;
mod write;

use bitflags::bitflags;

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::{Bbfs, FileStat};
use crate::nand::NandDevice;
use crate::rand::Rng;
use crate::superblock::SlotRef;

bitflags! {
    /// open() 的模式标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u8 {
        /// 允许读取
        const READ = 1 << 0;
        /// 允许写入
        const WRITE = 1 << 1;
        /// 不存在时创建
        const CREATE = 1 << 2;
        /// 与 CREATE 同时使用时，文件已存在则失败
        const EXCL = 1 << 3;
        /// 打开时清空文件
        const TRUNC = 1 << 4;
        /// 打开后定位到文件末尾
        const APPEND = 1 << 5;
    }
}

bitflags! {
    /// 会话状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct FileFlags: u8 {
        /// 会话可读
        const READING = 1 << 0;
        /// 会话可写
        const WRITING = 1 << 1;
        /// 页缓存中有未写出的页
        const PAGE_CACHED = 1 << 2;
        /// 当前块已被复制到影子块
        const BLOCK_SHADOWED = 1 << 3;
        /// ftruncate 扩展被推迟，零字节尚未写入
        const LAZY_EXTEND = 1 << 4;
    }
}

/// seek 的起点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// 文件开头
    Start,
    /// 当前位置
    Current,
    /// 文件末尾
    End,
}

/// 打开的文件
///
/// 所有操作都需要传入所属的文件系统；未经 [`File::close`] 就丢弃
/// 会话会丢失尚未拼接的影子块和未 flush 的元数据。
#[derive(Debug)]
pub struct File {
    pub(crate) entry_idx: u16,
    pub(crate) pos: u32,
    pub(crate) block: i16,
    pub(crate) prev_link: SlotRef,
    pub(crate) flags: FileFlags,
    /// 懒扩展的目标大小（仅在 LAZY_EXTEND 置位时有效）
    pub(crate) final_size: u32,
    /// 单页写缓存
    pub(crate) page_cache: [u8; NAND_PAGE_SIZE],
    /// 缓存页在文件内的起始位置（仅在 PAGE_CACHED 置位时有效）
    pub(crate) cached_page_pos: u32,
    /// 影子块内已写入的页位图；拼接时其余页从旧块继承
    pub(crate) page_dirty_mask: u32,
}

impl File {
    pub(crate) fn new(entry_idx: u16, first_block: i16, flags: OpenFlags) -> Self {
        let mut file_flags = FileFlags::empty();
        if flags.contains(OpenFlags::READ) {
            file_flags.insert(FileFlags::READING);
        }
        if flags.contains(OpenFlags::WRITE) {
            file_flags.insert(FileFlags::WRITING);
        }
        Self {
            entry_idx,
            pos: 0,
            block: first_block,
            prev_link: SlotRef::Entry(entry_idx),
            flags: file_flags,
            final_size: 0,
            page_cache: [0; NAND_PAGE_SIZE],
            cached_page_pos: 0,
            page_dirty_mask: 0,
        }
    }

    /// 当前文件位置
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// 文件元信息
    pub fn stat<D: NandDevice, R: Rng>(&self, fs: &Bbfs<D, R>) -> FileStat {
        fs.stat_entry(self.entry_idx as usize)
    }

    /// 重新解析链，把会话定位到 `target`（不超过文件大小）
    ///
    /// 会话不保存反向链接，跨块移动只能从文件头重走链。
    fn reposition<D: NandDevice, R: Rng>(
        &mut self,
        fs: &Bbfs<D, R>,
        target: u32,
    ) -> Result<()> {
        let size = fs.store.entry(self.entry_idx as usize).size;
        let mut remaining = target.min(size) as usize;
        self.prev_link = SlotRef::Entry(self.entry_idx);
        self.block = fs.store.read_slot(self.prev_link);
        while remaining >= NAND_BLOCK_SIZE {
            let cur = fs.store.checked_block(self.block)?;
            self.prev_link = SlotRef::Fat(cur as u16);
            self.block = fs.store.read_slot(self.prev_link);
            remaining -= NAND_BLOCK_SIZE;
        }
        Ok(())
    }

    /// 移动文件指针
    ///
    /// 位置可以超过文件末尾；若有懒扩展挂起，越过旧末尾的部分
    /// 会先通过常规写路径补零。
    pub fn seek<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
        offset: i64,
        whence: SeekFrom,
    ) -> Result<u32> {
        let size = fs.store.entry(self.entry_idx as usize).size;
        let mut pos = match whence {
            SeekFrom::Start => offset,
            SeekFrom::Current => self.pos as i64 + offset,
            SeekFrom::End => size as i64 + offset,
        };
        if pos < 0 {
            pos = 0;
        }
        if pos > u32::MAX as i64 {
            return Err(Error::new(ErrorKind::InvalidInput, "Seek position too large"));
        }
        let pos = pos as u32;
        let clamped = pos.min(size);

        // 边界判断用实际目标位置：目标可以越过文件末尾，而缓存页
        // 跟随的是位置本身，不是被大小截断后的位置
        let page_changed =
            pos as usize / NAND_PAGE_SIZE != self.pos as usize / NAND_PAGE_SIZE;
        let block_changed =
            pos as usize / NAND_BLOCK_SIZE != self.pos as usize / NAND_BLOCK_SIZE;

        // 离开当前页/块之前先把写到一半的内容落盘并完成拼接
        if self.flags.contains(FileFlags::WRITING) && page_changed {
            self.write_page_end(fs)?;
            if block_changed {
                self.write_block_end(fs)?;
            }
        }
        if block_changed {
            self.reposition(fs, clamped)?;
        }

        if self.flags.contains(FileFlags::LAZY_EXTEND) && pos > size {
            if size >= self.final_size {
                // 普通写入已经越过了目标大小，扩展不再需要
                self.flags.remove(FileFlags::LAZY_EXTEND);
            } else {
                let target = pos.min(self.final_size);
                self.pos = size;
                self.extend(fs, target)?;
                if target == self.final_size {
                    self.flags.remove(FileFlags::LAZY_EXTEND);
                }
                return Ok(self.pos);
            }
        }

        self.pos = pos;
        Ok(self.pos)
    }

    /// 截断或（懒）扩展文件
    pub fn truncate<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
        len: u32,
    ) -> Result<()> {
        if !self.flags.contains(FileFlags::WRITING) {
            return Err(Error::new(ErrorKind::BadDescriptor, "File not open for writing"));
        }
        let size = fs.store.entry(self.entry_idx as usize).size;
        if len < size {
            // 先完成手头的影子块，链处于一致状态后才能剪
            self.write_page_end(fs)?;
            self.write_block_end(fs)?;
            fs.shrink_entry(self.entry_idx as usize, len)?;
            if self.pos > len {
                self.pos = len;
            }
            self.reposition(fs, self.pos)?;
            // 之前的扩展请求被这次缩小覆盖
            self.flags.remove(FileFlags::LAZY_EXTEND);
        } else if len > size {
            // 只记下目标大小：调用方多半马上就要写这段数据，
            // 急着填零是白费擦写
            self.flags.insert(FileFlags::LAZY_EXTEND);
            self.final_size = len;
            log::trace!("[FILE] lazy extend of entry {} to {}", self.entry_idx, len);
        }
        Ok(())
    }

    /// 通过常规写路径补零到 `until`
    ///
    /// 只允许在文件末尾调用。
    pub(crate) fn extend<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
        until: u32,
    ) -> Result<()> {
        debug_assert_eq!(self.pos, fs.store.entry(self.entry_idx as usize).size);
        let zeros = [0u8; NAND_PAGE_SIZE * 4];
        while self.pos < until {
            let n = ((until - self.pos) as usize).min(zeros.len());
            self.write(fs, &zeros[..n])?;
        }
        Ok(())
    }

    /// 关闭文件
    ///
    /// 写会话的持久化边界：完成最后的页/块拼接、兑现挂起的懒扩展，
    /// 然后把 superblock 写成新的一代。
    pub fn close<D: NandDevice, R: Rng>(mut self, fs: &mut Bbfs<D, R>) -> Result<()> {
        if self.flags.contains(FileFlags::WRITING) {
            self.write_page_end(fs)?;
            self.write_block_end(fs)?;
            if self.flags.contains(FileFlags::LAZY_EXTEND) {
                let final_size = self.final_size;
                self.seek(fs, final_size as i64, SeekFrom::Start)?;
                // 扩展本身可能又留下一个写到一半的块
                self.write_page_end(fs)?;
                self.write_block_end(fs)?;
            }
            fs.checkpoint()?;
        }
        Ok(())
    }
}
