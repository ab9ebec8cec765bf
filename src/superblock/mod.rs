//! Superblock 存储
//!
//! 这个模块维护磁盘元数据段（分配表 + 文件表 + footer）的内存镜像，
//! 跟踪哪些部分被修改过，并负责持久化：
//!
//! - [`read`] - 挂载时扫描保留区并选出最新的有效代
//! - [`write`] - 影子式落盘（永不原地覆盖）与格式化
//! - [`checksum`] - 16 位段校验和
//!
//! 所有对分配表和文件表的修改都必须经过这里的 setter，以便
//! 正确记录脏页掩码；flush 只在有脏数据时才真正写盘。

pub mod checksum;
mod read;
mod write;

pub use write::format;

pub(crate) use read::mount_store;

use alloc::vec::Vec;

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{FileEntry, Segment};

/// 指向"链接着某个块的槽位"的带标签引用
///
/// 一条块链的每个环节要么由文件表项的首块字段指向，要么由
/// 分配表的某一项指向。用带标签的枚举代替跨两张表的裸指针。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRef {
    /// 文件表项 `n` 的首块字段
    Entry(u16),
    /// 分配表全局第 `n` 项
    Fat(u16),
}

/// 全局块号到 (段索引, 段内槽位) 的纯映射
#[inline]
pub fn fat_locate(block: usize) -> (usize, usize) {
    (block >> 12, block & 0xFFF)
}

/// Superblock 的内存镜像与脏页跟踪
///
/// 挂载时填充一次，进程生命周期内常驻；文件和分配器操作在内存中
/// 修改它，在明确的持久化点（写关闭、unlink、显式 checkpoint）
/// 整体写入新选择的物理位置。
#[derive(Debug)]
pub struct SuperblockStore {
    segments: Vec<Segment>,
    /// 每段一个脏页掩码，1 位对应段镜像内的一个 512 字节页
    dirty: [u32; BBFS_MAX_SUPERBLOCKS],
    total_blocks: usize,
}

impl SuperblockStore {
    pub(crate) fn from_segments(segments: Vec<Segment>, total_blocks: usize) -> Self {
        Self {
            segments,
            dirty: [0; BBFS_MAX_SUPERBLOCKS],
            total_blocks,
        }
    }

    /// 设备总块数
    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    /// 段数（1 或 2）
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// 是否有未持久化的修改
    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|&m| m != 0)
    }

    /// 当前序列号（各段一致）
    pub fn seqno(&self) -> u32 {
        self.segments[0].footer.seqno
    }

    pub(crate) fn segment(&self, idx: usize) -> &Segment {
        &self.segments[idx]
    }

    pub(crate) fn segment_mut(&mut self, idx: usize) -> &mut Segment {
        &mut self.segments[idx]
    }

    /// 把段内 `[offset, offset+len)` 字节范围标记为脏
    fn mark(&mut self, seg: usize, offset: usize, len: usize) {
        debug_assert!(len > 0 && offset + len <= NAND_BLOCK_SIZE);
        let first_page = offset / NAND_PAGE_SIZE;
        let last_page = (offset + len - 1) / NAND_PAGE_SIZE;
        for page in first_page..=last_page {
            self.dirty[seg] |= 1 << page;
        }
    }

    pub(crate) fn mark_footer_dirty(&mut self, seg: usize) {
        self.mark(seg, BBFS_FOOTER_OFFSET, BBFS_FOOTER_SIZE);
    }

    pub(crate) fn clear_dirty(&mut self, seg: usize) {
        self.dirty[seg] = 0;
    }

    //=========================================================================
    // 分配表访问
    //=========================================================================

    /// 读分配表项
    pub fn fat_get(&self, block: usize) -> i16 {
        let (seg, slot) = fat_locate(block);
        self.segments[seg].fat[slot]
    }

    /// 写分配表项并记录脏页
    pub fn fat_set(&mut self, block: usize, value: i16) {
        let (seg, slot) = fat_locate(block);
        self.segments[seg].fat[slot] = value;
        self.mark(seg, slot * 2, 2);
    }

    /// 把分配表值当作块号使用
    ///
    /// 链中出现哨兵值或越界值即为文件系统损坏。
    pub fn checked_block(&self, value: i16) -> Result<usize> {
        if value < 0 || value as usize >= self.total_blocks {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid block link in chain"));
        }
        Ok(value as usize)
    }

    //=========================================================================
    // 文件表访问（文件表只存在于主段）
    //=========================================================================

    /// 读文件表项
    pub fn entry(&self, idx: usize) -> &FileEntry {
        &self.segments[0].entries[idx]
    }

    fn mark_entry(&mut self, idx: usize) {
        self.mark(0, BBFS_ENTRIES_OFFSET + idx * BBFS_ENTRY_SIZE, BBFS_ENTRY_SIZE);
    }

    /// 整体覆盖文件表项（创建文件时使用）
    pub fn put_entry(&mut self, idx: usize, entry: FileEntry) {
        self.segments[0].entries[idx] = entry;
        self.mark_entry(idx);
    }

    /// 更新文件大小
    pub fn set_entry_size(&mut self, idx: usize, size: u32) {
        self.segments[0].entries[idx].size = size;
        self.mark_entry(idx);
    }

    /// 更新有效标志
    pub fn set_entry_valid(&mut self, idx: usize, valid: bool) {
        self.segments[0].entries[idx].valid = valid as u8;
        self.mark_entry(idx);
    }

    /// 更新文件名与扩展名（fsck 修复填充字节时使用）
    pub fn set_entry_name(&mut self, idx: usize, name: [u8; 8], ext: [u8; 3]) {
        let entry = &mut self.segments[0].entries[idx];
        entry.name = name;
        entry.ext = ext;
        self.mark_entry(idx);
    }

    //=========================================================================
    // 槽位引用
    //=========================================================================

    /// 读槽位引用指向的值
    pub fn read_slot(&self, slot: SlotRef) -> i16 {
        match slot {
            SlotRef::Entry(idx) => self.segments[0].entries[idx as usize].block,
            SlotRef::Fat(block) => self.fat_get(block as usize),
        }
    }

    /// 写槽位引用指向的值并记录脏页
    pub fn write_slot(&mut self, slot: SlotRef, value: i16) {
        match slot {
            SlotRef::Entry(idx) => {
                self.segments[0].entries[idx as usize].block = value;
                self.mark_entry(idx as usize);
            }
            SlotRef::Fat(block) => self.fat_set(block as usize, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn empty_store() -> SuperblockStore {
        SuperblockStore::from_segments(vec![Segment::new(BBFS_MAGIC)], 4096)
    }

    #[test]
    fn test_fat_locate() {
        assert_eq!(fat_locate(0), (0, 0));
        assert_eq!(fat_locate(4095), (0, 4095));
        assert_eq!(fat_locate(4096), (1, 0));
        assert_eq!(fat_locate(8191), (1, 4095));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut store = empty_store();
        assert!(!store.is_dirty());

        // FAT 第 0 项落在第 0 页
        store.fat_set(0, FAT_TERMINATOR);
        assert!(store.is_dirty());
        assert_eq!(store.dirty[0] & 1, 1);

        store.clear_dirty(0);
        assert!(!store.is_dirty());

        // 文件表项落在 FAT 之后的页
        store.set_entry_size(0, 100);
        let page = BBFS_ENTRIES_OFFSET / NAND_PAGE_SIZE;
        assert!(store.dirty[0] & (1 << page) != 0);
    }

    #[test]
    fn test_slot_ref() {
        let mut store = empty_store();
        store.write_slot(SlotRef::Entry(3), 17);
        assert_eq!(store.entry(3).block, 17);
        assert_eq!(store.read_slot(SlotRef::Entry(3)), 17);

        store.write_slot(SlotRef::Fat(17), FAT_TERMINATOR);
        assert_eq!(store.read_slot(SlotRef::Fat(17)), FAT_TERMINATOR);
        assert_eq!(store.fat_get(17), FAT_TERMINATOR);
    }

    #[test]
    fn test_checked_block() {
        let store = empty_store();
        assert_eq!(store.checked_block(5).unwrap(), 5);
        assert!(store.checked_block(FAT_TERMINATOR).is_err());
        assert!(store.checked_block(FAT_BADBLOCK).is_err());
        assert!(store.checked_block(4096).is_err());
    }
}
