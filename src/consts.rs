//! BBFS 文件系统常量定义
//!
//! 这个模块包含了 BBFS 文件系统的所有常量定义，包括：
//! - NAND 几何参数
//! - 磁盘布局相关常量
//! - 分配表哨兵值
//! - 分配策略阈值

//=============================================================================
// NAND 几何参数
//=============================================================================

/// NAND 块大小（最小擦除单位，16 KiB）
pub const NAND_BLOCK_SIZE: usize = 16384;

/// NAND 页大小（块内最小写入单位，512 字节）
pub const NAND_PAGE_SIZE: usize = 512;

/// 每块包含的页数
pub const NAND_PAGES_PER_BLOCK: usize = NAND_BLOCK_SIZE / NAND_PAGE_SIZE;

//=============================================================================
// Superblock 布局
//=============================================================================

/// 每个 superblock 段的分配表项数（每段可寻址 4096 个块）
pub const BBFS_FAT_ENTRIES: usize = 4096;

/// 分配表在段内占用的字节数
pub const BBFS_FAT_BYTES: usize = BBFS_FAT_ENTRIES * 2;

/// 文件表项数上限
pub const BBFS_MAX_ENTRIES: usize = 409;

/// 单个文件表项的字节数
pub const BBFS_ENTRY_SIZE: usize = 20;

/// 文件表在段内的字节偏移
pub const BBFS_ENTRIES_OFFSET: usize = BBFS_FAT_BYTES;

/// Footer 字节数
pub const BBFS_FOOTER_SIZE: usize = 12;

/// Footer 在段内的字节偏移
pub const BBFS_FOOTER_OFFSET: usize = NAND_BLOCK_SIZE - BBFS_FOOTER_SIZE;

/// 主段魔数
pub const BBFS_MAGIC: [u8; 4] = *b"BBFS";

/// 链接段魔数（设备超过 4096 块时的第二段）
pub const BBFS_MAGIC_LINKED: [u8; 4] = *b"BBFL";

/// 段内所有 16 位大端字之和必须等于该常量
pub const BBFS_CHECKSUM: u16 = 0xCAD7;

/// 设备末尾为 superblock 保留的块数
pub const BBFS_SB_AREA_BLOCKS: usize = 16;

/// 最多支持的 superblock 段数（8192 块，128 MiB 设备）
pub const BBFS_MAX_SUPERBLOCKS: usize = 2;

//=============================================================================
// 分配表哨兵值
//=============================================================================

/// 空闲块
pub const FAT_UNUSED: i16 = 0;

/// 链终止符（同时表示空文件的首块指针）
pub const FAT_TERMINATOR: i16 = -1;

/// 坏块
pub const FAT_BADBLOCK: i16 = -2;

/// 保留块（superblock 区域）
pub const FAT_RESERVED: i16 = -3;

//=============================================================================
// 分配策略
//=============================================================================

/// 大文件阈值：不小于该大小的文件存放在文件系统开头
pub const BBFS_BIGFILE_THRESHOLD: u32 = 512 * 1024;

/// 小文件区域的最小大小（字节）
pub const BBFS_SMALL_AREA_MIN: usize = 1024 * 1024;

/// 小文件区域的最小大小（块）
pub const BBFS_SMALL_AREA_MIN_BLOCKS: usize = BBFS_SMALL_AREA_MIN / NAND_BLOCK_SIZE;
