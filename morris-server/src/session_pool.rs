//! 会话 ID 分配
//!
//! 每次分配随机选取起点与方向，会话 ID 不会按顺序出现，难以被猜到。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use protocol::SessionId;

/// 默认容量：覆盖全部 u16 取值
pub const SESSION_POOL_SIZE: usize = SessionId::MAX as usize + 1;

/// 会话 ID 池
pub struct SessionPool<R = StdRng> {
    pool: Vec<bool>,
    rng: R,
}

impl SessionPool<StdRng> {
    /// 使用系统熵源播种的随机数生成器
    pub fn new() -> Self {
        Self::with_rng(SESSION_POOL_SIZE, StdRng::from_entropy())
    }
}

impl Default for SessionPool<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> SessionPool<R> {
    /// 指定容量与随机数生成器（测试时注入带种子的生成器）
    pub fn with_rng(size: usize, rng: R) -> Self {
        Self {
            pool: vec![false; size.clamp(1, SESSION_POOL_SIZE)],
            rng,
        }
    }

    /// 分配一个会话 ID；池已满时返回 None
    pub fn alloc(&mut self) -> Option<SessionId> {
        let size = self.pool.len();
        let start = self.rng.gen_range(0..size);
        let right = self.rng.gen_bool(0.5);

        let found = if right {
            // [start, size) 然后 [0, start)
            (start..size).chain(0..start).find(|&id| !self.pool[id])
        } else {
            // start 降到 0，然后 size-1 降到 start+1
            (0..=start)
                .rev()
                .chain((start + 1..size).rev())
                .find(|&id| !self.pool[id])
        };

        let id = found?;
        self.pool[id] = true;

        Some(id as SessionId)
    }

    /// 释放会话 ID
    pub fn free(&mut self, session_id: SessionId) {
        let slot = &mut self.pool[session_id as usize];
        debug_assert!(*slot, "freeing session id {session_id} that was not allocated");
        *slot = false;
    }

    pub fn is_allocated(&self, session_id: SessionId) -> bool {
        self.pool.get(session_id as usize).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn seeded(size: usize, seed: u64) -> SessionPool<ChaCha8Rng> {
        SessionPool::with_rng(size, ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = seeded(64, 1);

        let ids: HashSet<_> = (0..64).map(|_| pool.alloc().unwrap()).collect();
        assert_eq!(ids.len(), 64);
        assert_eq!(pool.alloc(), None);
    }

    #[test]
    fn test_never_returns_held_id() {
        let mut pool = seeded(32, 7);
        let mut held = HashSet::new();

        for round in 0..500 {
            if round % 3 == 2 {
                let id = *held.iter().next().unwrap();
                held.remove(&id);
                pool.free(id);
            } else if let Some(id) = pool.alloc() {
                assert!(held.insert(id), "id {id} handed out twice");
            }
        }
    }

    #[test]
    fn test_free_then_reuse_last_slot() {
        let mut pool = seeded(8, 3);
        let ids: Vec<_> = (0..8).map(|_| pool.alloc().unwrap()).collect();

        pool.free(ids[4]);
        assert!(!pool.is_allocated(ids[4]));
        assert_eq!(pool.alloc(), Some(ids[4]));
    }

    #[test]
    fn test_deterministic_with_seed() {
        let mut a = seeded(SESSION_POOL_SIZE, 42);
        let mut b = seeded(SESSION_POOL_SIZE, 42);

        for _ in 0..10 {
            assert_eq!(a.alloc(), b.alloc());
        }
    }

    #[test]
    fn test_randomized_distribution() {
        let mut pool = seeded(SESSION_POOL_SIZE, 99);
        let ids: Vec<_> = (0..10).map(|_| pool.alloc().unwrap()).collect();

        // 不是从 0 开始的连续序列
        assert_ne!(ids, (0..10).collect::<Vec<SessionId>>());
    }
}
