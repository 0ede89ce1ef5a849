//! 协作式任务调度
//!
//! 单线程，由外部每帧调用 `update` 驱动。任务分布在 active / next 两个列表中，
//! 每帧遍历一次 active，存活的任务移到 next，遍历结束后交换，
//! 同一帧内不会有任务被访问两次。

use std::time::{Duration, Instant};

/// 任务回调的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    /// 执行完毕，移除任务
    Done,
    /// 保留任务，下次继续执行
    Repeat,
}

type TaskFunction<C> = Box<dyn FnMut(&mut C) -> TaskResult>;

struct Task<C> {
    function: TaskFunction<C>,
    last_run_time: Instant,
    /// 为零时每帧都执行
    delay: Duration,
    /// 跳过下一次遍历
    deferred: bool,
}

/// 任务调度器
///
/// `C` 是回调可以修改的上下文（服务端的会话状态等）。
pub struct TaskManager<C> {
    active: Vec<Task<C>>,
    next: Vec<Task<C>>,
}

impl<C> TaskManager<C> {
    pub fn new() -> Self {
        Self {
            active: Vec::new(),
            next: Vec::new(),
        }
    }

    /// 添加任务，下一帧执行
    pub fn add_immediate<F>(&mut self, function: F)
    where
        F: FnMut(&mut C) -> TaskResult + 'static,
    {
        self.push(function, Duration::ZERO, false);
    }

    /// 添加延时任务，距上次执行满 `delay` 后才执行；返回 Repeat 则周期执行
    pub fn add_delayed<F>(&mut self, function: F, delay: Duration)
    where
        F: FnMut(&mut C) -> TaskResult + 'static,
    {
        self.push(function, delay, false);
    }

    /// 添加任务，保证跳过当前这一帧
    ///
    /// 用于避免重入，例如不能在连接断开的处理过程中直接给对手发消息。
    pub fn add_deferred<F>(&mut self, function: F)
    where
        F: FnMut(&mut C) -> TaskResult + 'static,
    {
        self.push(function, Duration::ZERO, true);
    }

    /// 执行一帧
    pub fn update(&mut self, context: &mut C) {
        self.update_at(context, Instant::now());
    }

    /// 以给定的当前时间执行一帧
    pub fn update_at(&mut self, context: &mut C, now: Instant) {
        for mut task in std::mem::take(&mut self.active) {
            if task.deferred {
                task.deferred = false;
                self.next.push(task);
                continue;
            }

            if !task.delay.is_zero() && now.saturating_duration_since(task.last_run_time) < task.delay {
                self.next.push(task);
                continue;
            }

            match (task.function)(context) {
                TaskResult::Repeat => {
                    task.last_run_time = now;
                    self.next.push(task);
                }
                TaskResult::Done => {}
            }
        }

        std::mem::swap(&mut self.active, &mut self.next);
        self.next.clear();
    }

    /// 待执行的任务数量
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.next.clear();
    }

    fn push<F>(&mut self, function: F, delay: Duration, deferred: bool)
    where
        F: FnMut(&mut C) -> TaskResult + 'static,
    {
        self.active.push(Task {
            function: Box::new(function),
            last_run_time: Instant::now(),
            delay,
            deferred,
        });
    }
}

impl<C> Default for TaskManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_immediate_runs_once() {
        let mut tasks = TaskManager::new();
        let mut counter = 0u32;

        tasks.add_immediate(|count: &mut u32| {
            *count += 1;
            TaskResult::Done
        });

        tasks.update(&mut counter);
        tasks.update(&mut counter);
        assert_eq!(counter, 1);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_repeat_every_tick() {
        let mut tasks = TaskManager::new();
        let mut counter = 0u32;

        tasks.add_immediate(|count: &mut u32| {
            *count += 1;
            TaskResult::Repeat
        });

        for _ in 0..5 {
            tasks.update(&mut counter);
        }
        assert_eq!(counter, 5);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_delayed_timing() {
        let mut tasks = TaskManager::new();
        let mut counter = 0u32;
        let start = Instant::now();

        tasks.add_delayed(
            |count: &mut u32| {
                *count += 1;
                TaskResult::Repeat
            },
            10 * SECOND,
        );

        tasks.update_at(&mut counter, start + 5 * SECOND);
        assert_eq!(counter, 0);

        tasks.update_at(&mut counter, start + 11 * SECOND);
        assert_eq!(counter, 1);

        tasks.update_at(&mut counter, start + 12 * SECOND);
        tasks.update_at(&mut counter, start + 20 * SECOND);
        assert_eq!(counter, 1);

        tasks.update_at(&mut counter, start + 21 * SECOND);
        assert_eq!(counter, 2);
    }

    #[test]
    fn test_delayed_done_removed() {
        let mut tasks = TaskManager::new();
        let mut counter = 0u32;
        let start = Instant::now();

        tasks.add_delayed(
            |count: &mut u32| {
                *count += 1;
                TaskResult::Done
            },
            SECOND,
        );

        tasks.update_at(&mut counter, start + 2 * SECOND);
        tasks.update_at(&mut counter, start + 4 * SECOND);
        assert_eq!(counter, 1);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_deferred_skips_one_tick() {
        let mut tasks = TaskManager::new();
        let mut log = Vec::new();

        tasks.add_deferred(|log: &mut Vec<&'static str>| {
            log.push("deferred");
            TaskResult::Done
        });
        tasks.add_immediate(|log: &mut Vec<&'static str>| {
            log.push("immediate");
            TaskResult::Done
        });

        tasks.update(&mut log);
        assert_eq!(log, vec!["immediate"]);

        tasks.update(&mut log);
        assert_eq!(log, vec!["immediate", "deferred"]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_order_preserved() {
        let mut tasks = TaskManager::new();
        let mut log = Vec::new();

        for i in 0..4 {
            tasks.add_immediate(move |log: &mut Vec<i32>| {
                log.push(i);
                TaskResult::Done
            });
        }

        tasks.update(&mut log);
        assert_eq!(log, vec![0, 1, 2, 3]);
    }
}
