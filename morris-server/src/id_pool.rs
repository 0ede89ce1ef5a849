//! 客户端 ID 分配

use protocol::ClientId;

/// 固定容量的客户端 ID 池
///
/// 位图 + 循环游标：每次从上次分配的位置之后开始查找空位，
/// 刚释放的 ID 不会马上被复用。
#[derive(Debug)]
pub struct IdPool {
    pool: Vec<bool>,
    cursor: usize,
}

impl IdPool {
    /// 创建容量为 `size` 的 ID 池（容量不超过 u16 取值范围）
    pub fn new(size: usize) -> Self {
        let size = size.min(ClientId::MAX as usize + 1);

        Self {
            pool: vec![false; size],
            cursor: 0,
        }
    }

    /// 分配一个 ID；池已满时返回 None
    pub fn alloc(&mut self) -> Option<ClientId> {
        let id = self
            .search(self.cursor, self.pool.len())
            .or_else(|| self.search(0, self.cursor))?;

        self.pool[id] = true;
        self.cursor = (id + 1) % self.pool.len();

        Some(id as ClientId)
    }

    /// 释放 ID
    pub fn free(&mut self, id: ClientId) {
        let slot = &mut self.pool[id as usize];
        debug_assert!(*slot, "freeing client id {id} that was not allocated");
        *slot = false;
    }

    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    /// 已分配的数量
    pub fn allocated(&self) -> usize {
        self.pool.iter().filter(|&&taken| taken).count()
    }

    fn search(&self, begin: usize, end: usize) -> Option<usize> {
        (begin..end).find(|&id| !self.pool[id])
    }
}
