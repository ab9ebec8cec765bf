//! 错误类型定义
//!
//! 提供 BBFS 文件系统操作的错误类型。

use core::fmt;

/// BBFS 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（NAND 驱动返回失败）
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏（块链中出现非法指针）
    Corrupted,
    /// 挂载时找不到有效的 superblock，文件系统不可用
    Superblock,
    /// 文件不存在
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 操作与打开模式不符
    BadDescriptor,
    /// 空间不足
    NoSpace,
    /// 不支持的操作
    Unsupported,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
