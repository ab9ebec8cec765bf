//! Superblock 校验和计算
//!
//! BBFS 的段校验和是一个 16 位补偿和：段内所有 16 位大端字
//! （包括校验和字段本身）相加，结果必须等于 `BBFS_CHECKSUM`。

use byteorder::{BigEndian, ByteOrder};

use crate::consts::{BBFS_CHECKSUM, BBFS_FOOTER_OFFSET, NAND_BLOCK_SIZE};

/// 计算段镜像所有 16 位大端字的和
pub fn image_sum(image: &[u8]) -> u16 {
    debug_assert_eq!(image.len(), NAND_BLOCK_SIZE);
    let mut sum: u16 = 0;
    for chunk in image.chunks_exact(2) {
        sum = sum.wrapping_add(BigEndian::read_u16(chunk));
    }
    sum
}

/// 验证段镜像的校验和
pub fn verify_image(image: &[u8]) -> bool {
    image_sum(image) == BBFS_CHECKSUM
}

/// 为段镜像补上校验和，使字和等于 `BBFS_CHECKSUM`
///
/// 会先清零镜像内的校验和字段再计算。返回写入的校验和值。
pub fn finalize_image(image: &mut [u8]) -> u16 {
    let csum_off = BBFS_FOOTER_OFFSET + 10;
    BigEndian::write_u16(&mut image[csum_off..csum_off + 2], 0);
    let csum = BBFS_CHECKSUM.wrapping_sub(image_sum(image));
    BigEndian::write_u16(&mut image[csum_off..csum_off + 2], csum);
    csum
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_finalize_then_verify() {
        let mut image = vec![0u8; NAND_BLOCK_SIZE];
        image[0] = 0x12;
        image[1] = 0x34;
        finalize_image(&mut image);
        assert!(verify_image(&image));
    }

    #[test]
    fn test_corruption_detected() {
        let mut image = vec![0u8; NAND_BLOCK_SIZE];
        finalize_image(&mut image);
        assert!(verify_image(&image));
        image[100] ^= 0x01;
        assert!(!verify_image(&image));
    }

    #[test]
    fn test_sum_is_constant() {
        let mut image = vec![0u8; NAND_BLOCK_SIZE];
        image[2000] = 0xAB;
        image[2001] = 0xCD;
        finalize_image(&mut image);
        assert_eq!(image_sum(&image), BBFS_CHECKSUM);
    }
}
