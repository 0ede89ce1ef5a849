//! 线程安全队列
//!
//! I/O 线程与应用线程之间传递消息使用。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 由单个互斥锁保护的双端队列
#[derive(Debug)]
pub struct SyncQueue<T> {
    queue: Mutex<VecDeque<T>>,
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // 持锁期间不会 panic，中毒的锁里数据仍然完整
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_back(&self, item: T) {
        self.lock().push_back(item);
    }

    pub fn push_front(&self, item: T) {
        self.lock().push_front(item);
    }

    pub fn pop_back(&self) -> Option<T> {
        self.lock().pop_back()
    }

    pub fn pop_front(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 一次性取出全部元素
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_and_lifo() {
        let queue = SyncQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        queue.push_front(0);

        assert_eq!(queue.size(), 3);
        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.pop_back(), Some(2));
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = SyncQueue::new();
        queue.push_back("a");
        queue.push_back("b");
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_producer_consumer_order() {
        let queue = Arc::new(SyncQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    queue.push_back(i);
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 1000 {
            if let Some(item) = queue.pop_front() {
                received.push(item);
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
