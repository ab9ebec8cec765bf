//! 伪随机数源
//!
//! 磨损均衡需要的随机性通过 trait 注入，而不是隐藏的全局生成器，
//! 这样分配和 superblock 落盘位置在测试中是可复现的。

/// 伪随机数源接口
pub trait Rng {
    /// 产生下一个 32 位随机数
    fn next_u32(&mut self) -> u32;

    /// 产生 `[0, n)` 范围内的随机数
    ///
    /// 采用 31 位乘法映射，避免取模偏差。
    fn randn(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        ((((self.next_u32() >> 1) as u64) * n as u64) >> 31) as usize
    }
}

/// 默认的 xorshift32 生成器
///
/// 质量足以用于磨损均衡，不用于任何安全目的。
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u32,
}

impl SimpleRng {
    /// 以给定种子创建生成器（种子 0 会被替换为固定非零值）
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E3779B9 } else { seed },
        }
    }
}

impl Rng for SimpleRng {
    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}
