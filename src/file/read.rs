//! 文件读取
//!
//! 沿分配表链整块整块地拷贝；读到文件末尾返回不足请求的字节数。

use super::{File, FileFlags};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Bbfs;
use crate::nand::NandDevice;
use crate::rand::Rng;
use crate::superblock::SlotRef;

impl File {
    /// 从当前位置读取数据
    ///
    /// # 返回
    ///
    /// 实际读取的字节数；已在文件末尾时返回 0。
    pub fn read<D: NandDevice, R: Rng>(
        &mut self,
        fs: &mut Bbfs<D, R>,
        buf: &mut [u8],
    ) -> Result<usize> {
        if !self.flags.contains(FileFlags::READING) {
            return Err(Error::new(ErrorKind::BadDescriptor, "File not open for reading"));
        }
        let size = fs.store.entry(self.entry_idx as usize).size;
        if self.pos >= size {
            return Ok(0);
        }

        let mut toread = ((size - self.pos) as usize).min(buf.len());
        let mut done = 0;
        while toread > 0 {
            let block = fs.store.checked_block(self.block)?;
            let offset = self.pos as usize % NAND_BLOCK_SIZE;
            let n = (NAND_BLOCK_SIZE - offset).min(toread);

            fs.dev.read(block, offset, &mut buf[done..done + n])?;
            self.pos += n as u32;
            done += n;
            toread -= n;

            // 跨过块边界时沿链前进
            if self.pos as usize % NAND_BLOCK_SIZE == 0 {
                self.prev_link = SlotRef::Fat(block as u16);
                self.block = fs.store.read_slot(self.prev_link);
            }
        }
        Ok(done)
    }
}
