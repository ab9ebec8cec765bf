//! 块分配
//!
//! 分配策略有两条相互竞争的路线：
//!
//! - **顺序优先**：上一块的下一块空闲就直接用它，减少碎片、
//!   利于大段连续读取；
//! - **小文件区域**：小文件改写频繁且几乎不做内存映射，碎片无关
//!   紧要，集中放在设备末尾的动态区域里随机分配，顺带均衡磨损；
//!   大文件则从设备开头线性查找，聚集在低地址。
//!
//! 分配器只挑选块，不写分配表——新块要等影子写协议完成拼接时
//! 才会在链上出现。

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::rand::Rng;
use crate::superblock::SuperblockStore;

/// 小文件区域的运行时状态
///
/// 区域是地址空间的一个后缀，从最后 1 MiB 起步，按需向低地址
/// 扩张，保证至少 20% 的区域保持空闲。空闲计数靠调用方维护：
/// 分配经过 [`allocate_block`]，释放方通过 [`SmallArea::note_freed`]
/// 归还计数。
#[derive(Debug, Clone)]
pub struct SmallArea {
    /// 区域起始块号
    start: usize,
    /// 区域内空闲块计数
    free: usize,
}

impl SmallArea {
    /// 挂载时根据分配表初始化区域
    pub fn init(store: &SuperblockStore) -> Self {
        let total_blocks = store.total_blocks();
        let area_blocks = BBFS_SMALL_AREA_MIN_BLOCKS.min(total_blocks - BBFS_SB_AREA_BLOCKS);
        let start = total_blocks - area_blocks;

        let mut free = 0;
        for block in start..total_blocks - BBFS_SB_AREA_BLOCKS {
            if store.fat_get(block) == FAT_UNUSED {
                free += 1;
            }
        }

        let mut area = Self { start, free };
        area.update(store);
        log::debug!("[ALLOC] small area starts at {} with {} free", area.start, area.free);
        area
    }

    /// 区域起始块号
    pub fn start(&self) -> usize {
        self.start
    }

    /// 区域内空闲块数
    pub fn free_blocks(&self) -> usize {
        self.free
    }

    /// 向低地址扩张区域，直到至少 20% 空闲或到达块 0
    fn update(&mut self, store: &SuperblockStore) {
        let total_blocks = store.total_blocks();
        while self.free * 5 < total_blocks - self.start {
            if self.start == 0 {
                break;
            }
            self.start -= 1;
            if store.fat_get(self.start) == FAT_UNUSED {
                self.free += 1;
            }
        }
    }

    /// 登记一次落在区域内的分配，必要时扩张区域
    pub fn note_alloc(&mut self, store: &SuperblockStore, block: usize) {
        if block >= self.start {
            self.free = self.free.saturating_sub(1);
            self.update(store);
        }
    }

    /// 登记一个块被释放（unlink、截断或影子替换归还旧块）
    pub fn note_freed(&mut self, block: usize) {
        if block >= self.start {
            self.free += 1;
        }
    }

    /// 在区域内查找一个空闲块
    ///
    /// 从随机位置开始线性回绕扫描；找不到说明区域已耗尽。
    /// 计数调整由调用方通过 [`SmallArea::note_alloc`] 完成。
    fn alloc<R: Rng>(&self, store: &SuperblockStore, rng: &mut R) -> Option<usize> {
        let total_blocks = store.total_blocks();
        let area_blocks = total_blocks - self.start;

        let mut block = self.start + rng.randn(area_blocks);
        for _ in 0..area_blocks {
            if store.fat_get(block) == FAT_UNUSED {
                return Some(block);
            }
            block += 1;
            if block >= total_blocks {
                block = self.start;
            }
        }
        None
    }
}

/// 分配一个物理块
///
/// # 参数
///
/// * `prev` - 文件链中的上一块（新链为 `FAT_TERMINATOR`）
/// * `big_file` - 文件（最终）大小是否达到大文件阈值
pub fn allocate_block<R: Rng>(
    store: &SuperblockStore,
    area: &mut SmallArea,
    rng: &mut R,
    prev: i16,
    big_file: bool,
) -> Result<usize> {
    let total_blocks = store.total_blocks();

    // 顺序优先：上一块的下一块空闲就直接使用
    if prev != FAT_TERMINATOR {
        let next = prev as usize + 1;
        if next < total_blocks && store.fat_get(next) == FAT_UNUSED {
            area.note_alloc(store, next);
            return Ok(next);
        }
    }

    // 小文件走小文件区域
    if !big_file {
        if let Some(block) = area.alloc(store, rng) {
            log::trace!("[ALLOC] small area block {}", block);
            area.note_alloc(store, block);
            return Ok(block);
        }
    }

    // 大文件（或小文件区域耗尽）：从头线性查找
    for block in 0..total_blocks {
        if store.fat_get(block) == FAT_UNUSED {
            log::trace!("[ALLOC] linear scan block {}", block);
            area.note_alloc(store, block);
            return Ok(block);
        }
    }

    Err(Error::new(ErrorKind::NoSpace, "No free blocks available"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nand::MemNand;
    use crate::rand::SimpleRng;
    use crate::superblock::format;

    const BLOCKS: usize = 256;

    fn fresh_store() -> SuperblockStore {
        let mut dev = MemNand::new(BLOCKS);
        format(&mut dev).unwrap();
        crate::superblock::mount_store(&mut dev).unwrap()
    }

    #[test]
    fn test_sequential_preference() {
        let store = fresh_store();
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(1);

        let block = allocate_block(&store, &mut area, &mut rng, 10, true).unwrap();
        assert_eq!(block, 11);
    }

    #[test]
    fn test_sequential_skips_used() {
        let mut store = fresh_store();
        store.fat_set(11, FAT_TERMINATOR);
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(1);

        // 下一块被占用时退回常规路径
        let block = allocate_block(&store, &mut area, &mut rng, 10, true).unwrap();
        assert_ne!(block, 11);
    }

    #[test]
    fn test_small_files_in_small_area() {
        let store = fresh_store();
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(2);

        for _ in 0..8 {
            let block =
                allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, false).unwrap();
            assert!(block >= area.start());
            assert!(block < BLOCKS - BBFS_SB_AREA_BLOCKS);
        }
    }

    #[test]
    fn test_big_files_at_low_addresses() {
        let store = fresh_store();
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(2);

        let block = allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, true).unwrap();
        assert_eq!(block, 0);
    }

    #[test]
    fn test_never_returns_reserved() {
        let mut store = fresh_store();
        // 除保留区外全部占用，只留一个 UNUSED
        for block in 0..BLOCKS - BBFS_SB_AREA_BLOCKS {
            store.fat_set(block, FAT_TERMINATOR);
        }
        store.fat_set(42, FAT_UNUSED);
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(3);

        let block = allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, false).unwrap();
        assert_eq!(block, 42);
    }

    #[test]
    fn test_out_of_space() {
        let mut store = fresh_store();
        for block in 0..BLOCKS - BBFS_SB_AREA_BLOCKS {
            store.fat_set(block, FAT_TERMINATOR);
        }
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(3);

        let err =
            allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn test_alloc_after_external_free_does_not_underflow() {
        let mut store = fresh_store();
        // 全部占满后区域扩张到块 0 且计数归零
        for block in 0..BLOCKS - BBFS_SB_AREA_BLOCKS {
            store.fat_set(block, FAT_TERMINATOR);
        }
        let mut area = SmallArea::init(&store);
        assert_eq!(area.start(), 0);
        assert_eq!(area.free_blocks(), 0);

        // 计数未登记的外部释放不能让后续分配崩溃
        store.fat_set(100, FAT_UNUSED);
        let mut rng = SimpleRng::new(5);
        let block = allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, false).unwrap();
        assert_eq!(block, 100);
        assert_eq!(area.free_blocks(), 0);
    }

    #[test]
    fn test_note_freed_restores_counter() {
        let mut store = fresh_store();
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(6);
        let before = area.free_blocks();

        let block = allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, false).unwrap();
        store.fat_set(block, FAT_TERMINATOR);
        assert_eq!(area.free_blocks(), before - 1);

        store.fat_set(block, FAT_UNUSED);
        area.note_freed(block);
        assert_eq!(area.free_blocks(), before);
    }

    #[test]
    fn test_small_area_keeps_free_ratio() {
        let mut store = fresh_store();
        let mut area = SmallArea::init(&store);
        let mut rng = SimpleRng::new(4);

        // 持续从小文件区域分配并占用，区域必须扩张以维持 20% 空闲
        for _ in 0..100 {
            let block =
                allocate_block(&store, &mut area, &mut rng, FAT_TERMINATOR, false).unwrap();
            store.fat_set(block, FAT_TERMINATOR);
            let area_blocks = store.total_blocks() - area.start();
            assert!(
                area.free_blocks() * 5 >= area_blocks || area.start() == 0,
                "free ratio dropped below 20%"
            );
        }
    }
}
