//! NAND 设备抽象
//!
//! BBFS 工作在原始 NAND 之上：以块为擦除粒度，以 (块, 块内偏移)
//! 寻址读写。驱动层被假定为同步完成；本层不做重试。

mod mem;

pub use mem::MemNand;

use crate::consts::NAND_BLOCK_SIZE;
use crate::error::Result;

/// NAND 设备接口
///
/// 实现此 trait 以提供底层 NAND 访问。
///
/// # 契约
///
/// - `erase_block` 是破坏性且幂等的，擦除后整块读出为 0xFF；
/// - `write` 只允许写入自上次写入以来已被擦除的块，违反该契约属于
///   驱动或调用方的编程错误，不属于可恢复的文件系统错误；
/// - 所有操作在调用线程上同步完成。
///
/// # 示例
///
/// ```rust,ignore
/// use bbfs_core::{NandDevice, Result};
///
/// struct MyNand {
///     // ...
/// }
///
/// impl NandDevice for MyNand {
///     fn size_bytes(&self) -> u64 {
///         64 * 1024 * 1024
///     }
///
///     fn read(&mut self, block: usize, offset: usize, buf: &mut [u8]) -> Result<()> {
///         // 从 NAND 读取
///         Ok(())
///     }
///
///     fn write(&mut self, block: usize, offset: usize, buf: &[u8]) -> Result<()> {
///         // 写入已擦除的块
///         Ok(())
///     }
///
///     fn erase_block(&mut self, block: usize) -> Result<()> {
///         // 整块擦除
///         Ok(())
///     }
/// }
/// ```
pub trait NandDevice {
    /// 设备总容量（字节）
    fn size_bytes(&self) -> u64;

    /// 从 (块, 块内偏移) 读取 `buf.len()` 字节
    fn read(&mut self, block: usize, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// 向 (块, 块内偏移) 写入 `buf.len()` 字节
    ///
    /// 目标块必须在本次写入前被擦除过。
    fn write(&mut self, block: usize, offset: usize, buf: &[u8]) -> Result<()>;

    /// 擦除一个块
    fn erase_block(&mut self, block: usize) -> Result<()>;

    /// 设备总块数
    fn total_blocks(&self) -> usize {
        (self.size_bytes() / NAND_BLOCK_SIZE as u64) as usize
    }
}
