//! 客户端到服务端的连接

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, error};

use protocol::{connect, ConnectionError, Message, Peer, SyncQueue};

/// I/O 线程上发生的第一个错误，等待应用线程取走
pub(crate) type ErrorSlot = Arc<Mutex<Option<ConnectionError>>>;

pub(crate) fn store_error(slot: &ErrorSlot, e: ConnectionError) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(e);
    }
}

/// 到服务端的连接
///
/// 建立连接是异步的：创建后立即返回，`connection_established` 变为 true
/// 之后才开始读取；在此之前发送的消息会排队，连接建立后依次写出。
#[derive(Debug)]
pub struct ServerConnection {
    peer: Peer,
    established: Arc<AtomicBool>,
}

impl ServerConnection {
    /// 在 I/O 运行时上解析地址并连接
    pub(crate) fn connect(
        handle: &Handle,
        host: &str,
        port: u16,
        incoming: Arc<SyncQueue<Message>>,
        error: ErrorSlot,
    ) -> Self {
        let (peer, pipelines) = Peer::new();
        let established = Arc::new(AtomicBool::new(false));

        let host = host.to_string();
        let flag = established.clone();
        let runtime = handle.clone();

        handle.spawn(async move {
            let stream = match connect(&host, port).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("连接服务端 {host}:{port} 失败: {e}");
                    store_error(&error, e);
                    return;
                }
            };

            debug!("已连接服务端 {host}:{port}");

            pipelines.start(
                &runtime,
                stream,
                move |message| {
                    incoming.push_back(message);
                    ControlFlow::Continue(())
                },
                Arc::new(move |e: ConnectionError| store_error(&error, e)),
            );

            flag.store(true, Ordering::Release);
        });

        Self { peer, established }
    }

    pub fn send(&self, message: Message) {
        self.peer.send(message);
    }

    pub fn close(&self) {
        self.peer.close();
    }

    pub fn is_open(&self) -> bool {
        self.peer.is_open()
    }

    pub fn connection_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }
}
