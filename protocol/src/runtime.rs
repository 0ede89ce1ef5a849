//! I/O 线程
//!
//! 每个门面（客户端或服务端）各自拥有一个后台线程，线程上运行单线程 tokio 运行时，
//! 所有套接字读写与 accept 都在这里完成；应用线程只通过 `handle` 投递任务。

use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

use crate::error::ConnectionError;

/// 后台 I/O 线程
pub struct IoThread {
    handle: Handle,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl IoThread {
    /// 启动 I/O 线程
    pub fn spawn(name: &str) -> Result<Self, ConnectionError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ConnectionError::Runtime)?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(token.cancelled());
                // 运行时在此线程上销毁，未完成的连接任务随之取消
            })
            .map_err(ConnectionError::Runtime)?;

        Ok(Self {
            handle,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// I/O 线程结束时取消的令牌
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.shutdown.is_cancelled()
    }

    /// 停止 I/O 线程并等待其退出（幂等）
    pub fn stop(&mut self) {
        self.shutdown.cancel();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("I/O 线程 panic");
            }
        }
    }
}

impl Drop for IoThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_spawn_and_stop() {
        let mut io = IoThread::spawn("test-io").unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        io.handle().spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });

        for _ in 0..100 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ran.load(Ordering::SeqCst));

        io.stop();
        io.stop();
        assert!(!io.is_running());
    }
}
