//! RAM 模拟 NAND 设备
//!
//! 用于测试和宿主机工具链，不依赖真实硬件。

use alloc::vec;
use alloc::vec::Vec;

use super::NandDevice;
use crate::consts::NAND_BLOCK_SIZE;
use crate::error::{Error, ErrorKind, Result};

/// RAM 模拟的 NAND 设备
///
/// 擦除后的块读出为 0xFF，与真实 NAND 一致。
pub struct MemNand {
    data: Vec<u8>,
    blocks: usize,
}

impl MemNand {
    /// 创建指定块数的设备，初始内容为全 0xFF（全新出厂态）
    pub fn new(blocks: usize) -> Self {
        Self {
            data: vec![0xFF; blocks * NAND_BLOCK_SIZE],
            blocks,
        }
    }

    /// 从现有镜像创建设备
    ///
    /// 镜像长度必须是块大小的整数倍。
    pub fn from_image(data: Vec<u8>) -> Result<Self> {
        if data.len() % NAND_BLOCK_SIZE != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Image size is not a multiple of the block size",
            ));
        }
        let blocks = data.len() / NAND_BLOCK_SIZE;
        Ok(Self { data, blocks })
    }

    /// 访问原始镜像
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// 访问原始镜像（可变）
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check_range(&self, block: usize, offset: usize, len: usize) -> Result<()> {
        if block >= self.blocks || offset + len > NAND_BLOCK_SIZE {
            return Err(Error::new(ErrorKind::Io, "NAND address out of range"));
        }
        Ok(())
    }
}

impl NandDevice for MemNand {
    fn size_bytes(&self) -> u64 {
        (self.blocks * NAND_BLOCK_SIZE) as u64
    }

    fn read(&mut self, block: usize, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_range(block, offset, buf.len())?;
        let start = block * NAND_BLOCK_SIZE + offset;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, block: usize, offset: usize, buf: &[u8]) -> Result<()> {
        self.check_range(block, offset, buf.len())?;
        let start = block * NAND_BLOCK_SIZE + offset;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn erase_block(&mut self, block: usize) -> Result<()> {
        self.check_range(block, 0, NAND_BLOCK_SIZE)?;
        let start = block * NAND_BLOCK_SIZE;
        self.data[start..start + NAND_BLOCK_SIZE].fill(0xFF);
        Ok(())
    }
}
