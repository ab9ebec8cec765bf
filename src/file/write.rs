//! 影子写协议
//!
//! 写入一个块的生命周期：
//!
//! 1. `write_block_begin` - 第一次写入某块时向分配器要一个新块并
//!    擦除（影子块）。旧块的链槽位原封不动，影子块是游离的孤块；
//! 2. 块内的页级写入 - 页对齐的整页直接写进影子块；非对齐部分
//!    经过单页缓存做读-改-写（`write_page_begin`/`write_page_end`），
//!    首次触碰时从**旧**块读入原内容；
//! 3. `write_block_end` - 写完该块（到达块尾、seek 离开或关闭）时
//!    拼接：会话没有触碰过的页先从旧块原样拷入影子块，然后影子块
//!    继承旧块的后继，指向旧块的槽位改指影子块，旧块标记空闲。
//!
//! 拼接之前磁盘上的链只含原有块，因此任何时刻断电都不会留下
//! 半截链；文件大小也只随已接收的字节增长，从不超前。

use super::{File, FileFlags};
use crate::balloc;
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Bbfs;
use crate::nand::NandDevice;
use crate::rand::Rng;
use crate::superblock::SlotRef;

impl File {
    /// 确保当前页在缓存中（首次触碰时从旧块读入）
    pub(crate) fn write_page_begin<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
    ) -> Result<()> {
        if !self.flags.contains(FileFlags::PAGE_CACHED) {
            let page_pos = self.pos - self.pos % NAND_PAGE_SIZE as u32;
            let old = fs.store.read_slot(self.prev_link);
            if old >= 0 {
                fs.dev.read(
                    old as usize,
                    page_pos as usize % NAND_BLOCK_SIZE,
                    &mut self.page_cache,
                )?;
            } else {
                // 新链没有旧数据可读
                self.page_cache.fill(0);
            }
            self.cached_page_pos = page_pos;
            self.flags.insert(FileFlags::PAGE_CACHED);
        }
        Ok(())
    }

    /// 把缓存的页写出到影子块
    pub(crate) fn write_page_end<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
    ) -> Result<()> {
        if self.flags.contains(FileFlags::PAGE_CACHED) {
            let block = fs.store.checked_block(self.block)?;
            let offset = self.cached_page_pos as usize % NAND_BLOCK_SIZE;
            fs.dev.write(block, offset, &self.page_cache)?;
            self.page_dirty_mask |= 1 << (offset / NAND_PAGE_SIZE);
            self.flags.remove(FileFlags::PAGE_CACHED);
        }
        Ok(())
    }

    /// 为当前块分配并擦除影子块
    pub(crate) fn write_block_begin<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
    ) -> Result<()> {
        if !self.flags.contains(FileFlags::BLOCK_SHADOWED) {
            let final_size = if self.flags.contains(FileFlags::LAZY_EXTEND) {
                self.final_size
            } else {
                fs.store.entry(self.entry_idx as usize).size
            };
            let prev = fs.store.read_slot(self.prev_link);
            let block = balloc::allocate_block(
                &fs.store,
                &mut fs.area,
                &mut fs.rng,
                prev,
                final_size >= BBFS_BIGFILE_THRESHOLD,
            )?;
            fs.dev.erase_block(block)?;
            self.block = block as i16;
            self.page_dirty_mask = 0;
            self.flags.insert(FileFlags::BLOCK_SHADOWED);
            log::trace!("[FILE] shadow block {} for entry {}", block, self.entry_idx);
        }
        Ok(())
    }

    /// 把影子块拼接进链，释放旧块
    pub(crate) fn write_block_end<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
    ) -> Result<()> {
        if self.flags.contains(FileFlags::BLOCK_SHADOWED) {
            let new_block = fs.store.checked_block(self.block)?;
            let old = fs.store.read_slot(self.prev_link);
            if old != FAT_TERMINATOR {
                let old_block = fs.store.checked_block(old)?;

                // 会话没写过的页从旧块原样继承
                let mut page = [0u8; NAND_PAGE_SIZE];
                for page_idx in 0..NAND_PAGES_PER_BLOCK {
                    if self.page_dirty_mask & (1 << page_idx) != 0 {
                        continue;
                    }
                    let offset = page_idx * NAND_PAGE_SIZE;
                    fs.dev.read(old_block, offset, &mut page)?;
                    fs.dev.write(new_block, offset, &page)?;
                }

                // prev -> old -> next 变为 prev -> new -> next
                let next = fs.store.fat_get(old_block);
                fs.store.fat_set(new_block, next);
                fs.store.fat_set(old_block, FAT_UNUSED);
                fs.area.note_freed(old_block);
                fs.store.write_slot(self.prev_link, new_block as i16);
            } else {
                // 链尾的全新块
                fs.store.write_slot(self.prev_link, new_block as i16);
                fs.store.fat_set(new_block, FAT_TERMINATOR);
            }
            self.prev_link = SlotRef::Fat(new_block as u16);
            self.block = fs.store.read_slot(self.prev_link);
            self.page_dirty_mask = 0;
            self.flags.remove(FileFlags::BLOCK_SHADOWED);
        }
        Ok(())
    }

    /// 在当前（影子）块内写入，不跨块
    fn block_write<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
        data: &[u8],
    ) -> Result<usize> {
        let mut written = 0;
        while written < data.len() {
            let offset = self.pos as usize % NAND_PAGE_SIZE;
            let n = (NAND_PAGE_SIZE - offset).min(data.len() - written);

            if offset == 0 && n == NAND_PAGE_SIZE {
                // 快路径：整页直写
                debug_assert!(!self.flags.contains(FileFlags::PAGE_CACHED));
                let block = fs.store.checked_block(self.block)?;
                let block_offset = self.pos as usize % NAND_BLOCK_SIZE;
                fs.dev.write(block, block_offset, &data[written..written + n])?;
                self.page_dirty_mask |= 1 << (block_offset / NAND_PAGE_SIZE);
            } else {
                // 慢路径：读-改-写经过页缓存
                self.write_page_begin(fs)?;
                self.page_cache[offset..offset + n]
                    .copy_from_slice(&data[written..written + n]);
            }

            self.pos += n as u32;
            written += n;

            // 写满一页就把缓存落盘
            if self.pos as usize % NAND_PAGE_SIZE == 0 {
                self.write_page_end(fs)?;
            }
        }

        // 大小只随已接收的字节增长
        let idx = self.entry_idx as usize;
        if self.pos > fs.store.entry(idx).size {
            fs.store.set_entry_size(idx, self.pos);
        }
        Ok(written)
    }

    /// 从当前位置写入数据
    ///
    /// # 返回
    ///
    /// 实际写入的字节数（等于 `buf.len()`，除非出错）。
    pub fn write<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
        buf: &[u8],
    ) -> Result<usize> {
        if !self.flags.contains(FileFlags::WRITING) {
            return Err(Error::new(ErrorKind::BadDescriptor, "File not open for writing"));
        }
        let mut written = 0;
        while written < buf.len() {
            self.write_block_begin(fs)?;

            let offset = self.pos as usize % NAND_BLOCK_SIZE;
            let n = (NAND_BLOCK_SIZE - offset).min(buf.len() - written);
            let w = self.block_write(fs, &buf[written..written + n])?;
            written += w;

            if self.pos as usize % NAND_BLOCK_SIZE == 0 {
                self.write_block_end(fs)?;
            }
        }
        Ok(written)
    }
}
