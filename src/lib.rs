//! bbfs_core: Pure Rust BBFS NAND filesystem implementation
//!
//! 这是一个纯 Rust 实现的 BBFS 文件系统库（掌机 NAND 闪存上的
//! 平坦 8.3 文件系统），旨在提供：
//! - **零 unsafe 代码**
//! - **Rust 惯用风格**的 API
//! - **显式的文件系统上下文**（没有进程级全局状态）
//! - **可注入的设备与随机源**（便于测试与移植）
//!
//! # 示例
//!
//! ```rust,ignore
//! use bbfs_core::{Bbfs, MemNand, OpenFlags, SimpleRng, Result};
//!
//! fn main() -> Result<()> {
//!     let mut dev = MemNand::new(4096);
//!     bbfs_core::format(&mut dev)?;
//!
//!     let mut fs = Bbfs::mount(dev, SimpleRng::new(42))?;
//!     let mut file = fs.open("SAVE.BIN", OpenFlags::WRITE | OpenFlags::CREATE)?;
//!     file.write(&mut fs, b"hello")?;
//!     file.close(&mut fs)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`types`] - 磁盘数据结构定义
//! - [`nand`] - NAND 设备抽象
//! - [`rand`] - 随机源抽象
//! - [`superblock`] - Superblock 存储与持久化
//! - [`balloc`] - 块分配
//! - [`dir`] - 目录操作
//! - [`file`] - 打开文件的会话
//! - `fsck` - 一致性检查与修复（经 [`fs::Bbfs::fsck`] 使用）
//! - [`fs`] - 文件系统高级 API

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 磁盘数据结构定义
pub mod types;

/// NAND 设备抽象
pub mod nand;

/// 随机源抽象
pub mod rand;

/// Superblock 存储
pub mod superblock;

/// 块分配
pub mod balloc;

/// 目录操作
pub mod dir;

/// 打开文件的会话
pub mod file;

/// 一致性检查与修复
pub(crate) mod fsck;

/// 文件系统高级 API
pub mod fs;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// NAND 设备
pub use nand::{MemNand, NandDevice};

// 随机源
pub use rand::{Rng, SimpleRng};

// Superblock
pub use superblock::{format, SuperblockStore};

// 块分配
pub use balloc::SmallArea;

// 目录
pub use dir::{display_name, Dir, DirEntry, FileName};

// 文件会话
pub use file::{File, OpenFlags, SeekFrom};

// 文件系统
pub use fs::{Bbfs, FileStat};
