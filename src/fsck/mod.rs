//! 离线一致性检查与修复
//!
//! 对挂载后的内存镜像做三轮检查：
//!
//! 1. **文件名填充** - 名字字段在终止符之后必须全为 0，否则同名
//!    查找会失配（修复：清零填充字节）；
//! 2. **重名** - 两个有效表项不得持有相同的 11 字节名字（修复：
//!    使靠后的表项无效，其块留给第 3 轮回收）;
//! 3. **块链** - 每条链必须无环、无交叉、长度与文件大小一致，
//!    且每个已占用的块恰好属于一个文件（修复：剪断坏链、修正
//!    大小、回收孤块）。
//!
//! 所有检查只改内存镜像；持久化由调用方在检查结束后统一执行。

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use crate::consts::*;
use crate::dir::display_name;
use crate::error::Result;
use crate::superblock::{SlotRef, SuperblockStore};

/// 一次检查的运行状态
struct Fsck<'a> {
    fix_errors: bool,
    found: u32,
    fixed: u32,
    unfixable: u32,
    report: Option<&'a mut dyn FnMut(&str, bool)>,
}

impl Fsck<'_> {
    /// 记录一个问题，返回是否应当就地修复
    fn problem(&mut self, msg: &str, fixable: bool) -> bool {
        self.found += 1;
        if !fixable {
            self.unfixable += 1;
        }
        log::warn!("[FSCK] {}", msg);
        if let Some(report) = self.report.as_deref_mut() {
            report(msg, fixable);
        }
        let fix = fixable && self.fix_errors;
        if fix {
            self.fixed += 1;
        }
        fix
    }
}

/// 运行全部检查
///
/// 返回文件系统是否没有不可修复的问题；可修复的问题逐条报告，
/// 是否就地修复由 `fix_errors` 决定，不影响返回值。
pub(crate) fn run(
    store: &mut SuperblockStore,
    fix_errors: bool,
    report: Option<&mut dyn FnMut(&str, bool)>,
) -> Result<bool> {
    let mut ctx = Fsck {
        fix_errors,
        found: 0,
        fixed: 0,
        unfixable: 0,
        report,
    };

    check_padding(store, &mut ctx);
    check_duplicates(store, &mut ctx);
    check_chains(store, &mut ctx)?;

    if ctx.found == 0 {
        log::info!("[FSCK] no problems found");
    } else {
        log::info!(
            "[FSCK] {} problem(s) found, {} fixed, {} unfixable",
            ctx.found,
            ctx.fixed,
            ctx.unfixable
        );
    }
    Ok(ctx.unfixable == 0)
}

/// 第 1 轮：文件名字段的填充字节必须为 0
fn check_padding(store: &mut SuperblockStore, ctx: &mut Fsck<'_>) {
    for idx in 0..BBFS_MAX_ENTRIES {
        let entry = *store.entry(idx);
        if !entry.is_valid() {
            continue;
        }
        let nlen = entry.name.iter().position(|&b| b == 0).unwrap_or(8);
        let elen = entry.ext.iter().position(|&b| b == 0).unwrap_or(3);
        if entry.name[nlen..].iter().all(|&b| b == 0)
            && entry.ext[elen..].iter().all(|&b| b == 0)
        {
            continue;
        }
        let msg = format!(
            "entry {} ({}): garbage bytes in filename padding",
            idx,
            display_name(&entry)
        );
        if ctx.problem(&msg, true) {
            let mut name = entry.name;
            let mut ext = entry.ext;
            name[nlen..].fill(0);
            ext[elen..].fill(0);
            store.set_entry_name(idx, name, ext);
        }
    }
}

/// 原始固件的文件名哈希（用于重名检查的布隆过滤）
fn name_hash(raw: &[u8; 11]) -> u32 {
    let mut hash: u32 = 0;
    for &b in raw {
        hash = hash.wrapping_add((b ^ 0x80) as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

/// 第 2 轮：重名检查
///
/// 先用 512 位布隆过滤器筛掉绝大多数表项，命中时才对更早的
/// 表项做逐字节比较。
fn check_duplicates(store: &mut SuperblockStore, ctx: &mut Fsck<'_>) {
    let mut bloom = [0u64; 8];
    for idx in 0..BBFS_MAX_ENTRIES {
        let entry = *store.entry(idx);
        if !entry.is_valid() {
            continue;
        }
        let raw = entry.raw_name();
        let hash = name_hash(&raw);
        let word = (hash >> 29) as usize;
        let bit = 1u64 << (hash & 63);

        if bloom[word] & bit != 0 {
            let dup = (0..idx).find(|&other| {
                store.entry(other).is_valid() && store.entry(other).raw_name() == raw
            });
            if let Some(other) = dup {
                let msg = format!(
                    "entry {} ({}): duplicate of entry {}",
                    idx,
                    display_name(&entry),
                    other
                );
                if ctx.problem(&msg, true) {
                    store.set_entry_valid(idx, false);
                    continue;
                }
            }
        }
        bloom[word] |= bit;
    }
}

/// 第 3 轮：块链一致性
///
/// 沿每条链走 `ceil(size / 块大小)` 步并登记所有权；链中出现坏
/// 指针、交叉、环或长度不符都在对应位置剪断并修正大小。最后
/// 扫一遍分配表，回收不属于任何文件的已占用块。
fn check_chains(store: &mut SuperblockStore, ctx: &mut Fsck<'_>) -> Result<()> {
    let total_blocks = store.total_blocks();
    let mut owner: Vec<Option<u16>> = vec![None; total_blocks];

    for idx in 0..BBFS_MAX_ENTRIES {
        let entry = *store.entry(idx);
        if !entry.is_valid() {
            continue;
        }
        let expected = (entry.size as usize + NAND_BLOCK_SIZE - 1) / NAND_BLOCK_SIZE;
        let name = display_name(&entry);

        let mut slot = SlotRef::Entry(idx as u16);
        let mut link = entry.block;
        let mut walked = 0usize;
        let mut intact = true;

        while walked < expected {
            if link == FAT_TERMINATOR {
                let msg = format!(
                    "entry {} ({}): chain ends after {} of {} block(s)",
                    idx, name, walked, expected
                );
                if ctx.problem(&msg, true) {
                    store.set_entry_size(idx, (walked * NAND_BLOCK_SIZE) as u32);
                }
                intact = false;
                break;
            }
            if link < 0 || link as usize >= total_blocks {
                let msg = format!(
                    "entry {} ({}): invalid block link {} at chain position {}",
                    idx, name, link, walked
                );
                if ctx.problem(&msg, true) {
                    store.write_slot(slot, FAT_TERMINATOR);
                    store.set_entry_size(idx, (walked * NAND_BLOCK_SIZE) as u32);
                }
                intact = false;
                break;
            }
            let block = link as usize;
            if let Some(holder) = owner[block] {
                let msg = if holder as usize == idx {
                    format!("entry {} ({}): chain loops back to block {}", idx, name, block)
                } else {
                    format!(
                        "entry {} ({}): block {} already belongs to entry {}",
                        idx, name, block, holder
                    )
                };
                if ctx.problem(&msg, true) {
                    store.write_slot(slot, FAT_TERMINATOR);
                    store.set_entry_size(idx, (walked * NAND_BLOCK_SIZE) as u32);
                }
                intact = false;
                break;
            }
            owner[block] = Some(idx as u16);
            slot = SlotRef::Fat(block as u16);
            link = store.fat_get(block);
            walked += 1;
        }

        // 链不得比文件大小要求的更长
        if intact && link != FAT_TERMINATOR {
            let msg = format!(
                "entry {} ({}): chain continues past {} block(s)",
                idx, name, expected
            );
            if ctx.problem(&msg, true) {
                // 多出来的尾巴变成孤块，由下面的回收扫描释放
                store.write_slot(slot, FAT_TERMINATOR);
            }
        }
    }

    // 孤块回收：已占用但不属于任何文件的块
    for block in 0..total_blocks {
        let value = store.fat_get(block);
        if value == FAT_UNUSED || value == FAT_BADBLOCK || value == FAT_RESERVED {
            continue;
        }
        if owner[block].is_none() {
            let msg = format!("block {}: in use but not reachable from any file", block);
            if ctx.problem(&msg, true) {
                store.fat_set(block, FAT_UNUSED);
            }
        }
    }
    Ok(())
}
