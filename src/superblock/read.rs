//! Superblock 读取与挂载选择
//!
//! 设备末尾的 16 个保留块里散落着历代 superblock；挂载时只读
//! 每块的 footer，按序列号从新到旧逐个完整校验，接受第一个
//! 完全有效的代。

use alloc::vec;
use alloc::vec::Vec;

use super::checksum::verify_image;
use super::SuperblockStore;
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::nand::NandDevice;
use crate::types::{Footer, Segment};

/// 扫描保留区并装载最新的有效 superblock
pub(crate) fn mount_store<D: NandDevice>(dev: &mut D) -> Result<SuperblockStore> {
    let total_blocks = dev.total_blocks();
    if total_blocks <= BBFS_SB_AREA_BLOCKS {
        return Err(Error::new(ErrorKind::InvalidInput, "Device too small"));
    }
    let num_segments = (total_blocks + BBFS_FAT_ENTRIES - 1) / BBFS_FAT_ENTRIES;
    if num_segments > BBFS_MAX_SUPERBLOCKS {
        return Err(Error::new(ErrorKind::InvalidInput, "Device too large"));
    }
    let sb_area = total_blocks - BBFS_SB_AREA_BLOCKS;

    // 只读 footer，收集主段候选
    let mut candidates: Vec<(usize, u32)> = Vec::new();
    for i in 0..BBFS_SB_AREA_BLOCKS {
        let mut buf = [0u8; BBFS_FOOTER_SIZE];
        dev.read(sb_area + i, BBFS_FOOTER_OFFSET, &mut buf)?;
        let footer = Footer::parse(&buf)?;
        if footer.magic == BBFS_MAGIC {
            candidates.push((i, footer.seqno));
        }
    }
    if candidates.is_empty() {
        log::error!("[MOUNT] no superblock candidate in reserved area");
        return Err(Error::new(ErrorKind::Superblock, "No valid superblock found"));
    }

    // 序列号大的在前
    candidates.sort_unstable_by(|a, b| b.1.cmp(&a.1));

    for &(idx, seqno) in &candidates {
        let mut image = vec![0u8; NAND_BLOCK_SIZE];
        dev.read(sb_area + idx, 0, &mut image)?;
        if !verify_image(&image) {
            log::warn!("[MOUNT] seqno={} at block {}: bad checksum", seqno, sb_area + idx);
            continue;
        }
        let primary = Segment::parse(&image)?;

        let mut segments = vec![primary];
        if num_segments == 2 {
            // 大设备：主段必须链接一个有效的续段
            let link = segments[0].footer.link as usize;
            if link == 0 || link >= total_blocks {
                log::warn!("[MOUNT] seqno={}: missing or out-of-range link", seqno);
                continue;
            }
            let mut linked = vec![0u8; NAND_BLOCK_SIZE];
            dev.read(link, 0, &mut linked)?;
            if !verify_image(&linked) {
                log::warn!("[MOUNT] seqno={}: linked segment bad checksum", seqno);
                continue;
            }
            let secondary = Segment::parse(&linked)?;
            if secondary.footer.magic != BBFS_MAGIC_LINKED
                || secondary.footer.seqno != segments[0].footer.seqno
            {
                log::warn!("[MOUNT] seqno={}: linked segment mismatch", seqno);
                continue;
            }
            segments.push(secondary);
        } else if segments[0].footer.link != 0 {
            log::warn!("[MOUNT] seqno={}: unexpected link on single-segment device", seqno);
            continue;
        }

        log::info!(
            "[MOUNT] superblock seqno={} selected ({} segment(s), {} blocks)",
            seqno,
            segments.len(),
            total_blocks
        );
        return Ok(SuperblockStore::from_segments(segments, total_blocks));
    }

    log::error!("[MOUNT] all superblock candidates rejected");
    Err(Error::new(ErrorKind::Superblock, "No valid superblock found"))
}
