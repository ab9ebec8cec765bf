//! Superblock 落盘与格式化
//!
//! 持久化协议的关键点：
//!
//! 1. 永不原地覆盖——每次 flush 在 16 块保留区内伪随机挑选一个
//!    新位置，擦除后整段写入，借机分摊磨损；
//! 2. 从编号最大的段写到主段——续段先落盘，其物理块号记入前一段
//!    的 link 字段，主段最后写入时已包含最终的 link，磁盘上的
//!    任何一代因此都只会引用一个完整写出的伙伴段；
//! 3. 没有脏数据时 flush 是空操作。

use alloc::vec;

use super::checksum::finalize_image;
use super::SuperblockStore;
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::nand::NandDevice;
use crate::rand::Rng;
use crate::types::Segment;

impl SuperblockStore {
    /// 把所有脏段持久化为新的一代
    pub fn flush<D: NandDevice, R: Rng>(&mut self, dev: &mut D, rng: &mut R) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let sb_area = self.total_blocks() - BBFS_SB_AREA_BLOCKS;
        let mut slot = rng.randn(BBFS_SB_AREA_BLOCKS);

        for seg_idx in (0..self.num_segments()).rev() {
            let block = sb_area + slot;

            self.segment_mut(seg_idx).footer.seqno += 1;
            self.mark_footer_dirty(seg_idx);

            let mut image = self.segment(seg_idx).to_image();
            let csum = finalize_image(&mut image);
            self.segment_mut(seg_idx).footer.checksum = csum;

            dev.erase_block(block)?;
            dev.write(block, 0, &image)?;
            self.clear_dirty(seg_idx);

            log::debug!(
                "[FLUSH] segment {} seqno={} written to block {}",
                seg_idx,
                self.segment(seg_idx).footer.seqno,
                block
            );

            if seg_idx > 0 {
                // 把续段的落点记入前一段；前一段稍后写出时会带上它
                self.segment_mut(seg_idx - 1).footer.link = block as u16;
                self.mark_footer_dirty(seg_idx - 1);
            }

            // 下一段写到保留区内的下一个位置
            slot = (slot + 1) % BBFS_SB_AREA_BLOCKS;
        }
        Ok(())
    }
}

/// 将设备格式化为空文件系统
///
/// 写入第 1 代 superblock：分配表全部空闲，保留区和不可寻址的
/// 表尾标记为 RESERVED，文件表全部无效。主段写在保留区起始处。
pub fn format<D: NandDevice>(dev: &mut D) -> Result<()> {
    let total_blocks = dev.total_blocks();
    if total_blocks <= BBFS_SB_AREA_BLOCKS {
        return Err(Error::new(ErrorKind::InvalidInput, "Device too small"));
    }
    let num_segments = (total_blocks + BBFS_FAT_ENTRIES - 1) / BBFS_FAT_ENTRIES;
    if num_segments > BBFS_MAX_SUPERBLOCKS {
        return Err(Error::new(ErrorKind::InvalidInput, "Device too large"));
    }
    let sb_area = total_blocks - BBFS_SB_AREA_BLOCKS;

    let mut segments = vec![];
    for seg_idx in 0..num_segments {
        let magic = if seg_idx == 0 { BBFS_MAGIC } else { BBFS_MAGIC_LINKED };
        let mut seg = Segment::new(magic);
        seg.footer.seqno = 1;
        for local in 0..BBFS_FAT_ENTRIES {
            let block = seg_idx * BBFS_FAT_ENTRIES + local;
            if block >= sb_area {
                seg.fat[local] = FAT_RESERVED;
            }
        }
        segments.push(seg);
    }
    if num_segments == 2 {
        segments[0].footer.link = (sb_area + 1) as u16;
    }

    // 续段先写，主段最后写
    for seg_idx in (0..num_segments).rev() {
        let block = sb_area + seg_idx;
        let mut image = segments[seg_idx].to_image();
        finalize_image(&mut image);
        dev.erase_block(block)?;
        dev.write(block, 0, &image)?;
    }
    log::info!(
        "[FORMAT] {} blocks, {} segment(s), superblock area at {}",
        total_blocks,
        num_segments,
        sb_area
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::read::mount_store;
    use super::*;
    use crate::nand::MemNand;
    use crate::rand::SimpleRng;

    const BLOCKS: usize = 256;

    #[test]
    fn test_flush_noop_when_clean() {
        let mut dev = MemNand::new(BLOCKS);
        format(&mut dev).unwrap();
        let mut store = mount_store(&mut dev).unwrap();
        let before = dev.image().to_vec();

        let mut rng = SimpleRng::new(1);
        store.flush(&mut dev, &mut rng).unwrap();
        assert_eq!(dev.image(), &before[..]);
        assert_eq!(store.seqno(), 1);
    }

    #[test]
    fn test_flush_bumps_seqno_and_persists() {
        let mut dev = MemNand::new(BLOCKS);
        format(&mut dev).unwrap();
        let mut store = mount_store(&mut dev).unwrap();
        let mut rng = SimpleRng::new(1);

        store.fat_set(10, FAT_TERMINATOR);
        store.set_entry_size(0, 123);
        store.flush(&mut dev, &mut rng).unwrap();
        assert_eq!(store.seqno(), 2);
        assert!(!store.is_dirty());

        let store = mount_store(&mut dev).unwrap();
        assert_eq!(store.seqno(), 2);
        assert_eq!(store.fat_get(10), FAT_TERMINATOR);
        assert_eq!(store.entry(0).size, 123);
    }

    #[test]
    fn test_flush_spreads_wear() {
        let mut dev = MemNand::new(BLOCKS);
        format(&mut dev).unwrap();
        let mut store = mount_store(&mut dev).unwrap();
        let mut rng = SimpleRng::new(99);

        // 多次 flush 应落在保留区内的多个不同块上
        let mut used = alloc::collections::BTreeSet::new();
        for gen in 0..8 {
            store.fat_set(20, gen as i16 + 1);
            store.flush(&mut dev, &mut rng).unwrap();
            for b in BLOCKS - BBFS_SB_AREA_BLOCKS..BLOCKS {
                let off = b * NAND_BLOCK_SIZE + BBFS_FOOTER_OFFSET;
                let footer =
                    crate::types::Footer::parse(&dev.image()[off..off + BBFS_FOOTER_SIZE]).unwrap();
                if footer.magic == BBFS_MAGIC && footer.seqno == store.seqno() {
                    used.insert(b);
                }
            }
        }
        assert!(used.len() > 1);
    }

    #[test]
    fn test_two_segment_flush_links() {
        let mut dev = MemNand::new(8192);
        format(&mut dev).unwrap();
        let mut store = mount_store(&mut dev).unwrap();
        let mut rng = SimpleRng::new(5);

        // 修改第二段寻址的块
        store.fat_set(5000, FAT_TERMINATOR);
        store.flush(&mut dev, &mut rng).unwrap();

        let store = mount_store(&mut dev).unwrap();
        assert_eq!(store.seqno(), 2);
        assert_eq!(store.num_segments(), 2);
        assert_eq!(store.fat_get(5000), FAT_TERMINATOR);
        // 主段的 link 必须指向保留区内的块
        let link = store.segment(0).footer.link as usize;
        assert!(link >= 8192 - BBFS_SB_AREA_BLOCKS && link < 8192);
    }
}
