//! 通用对端连接
//!
//! 服务端的 `ClientConnection` 与客户端的 `ServerConnection` 共用这里的读写流水线，
//! 差异只在注入的回调:
//! - 读流水线: 读消息头 → (有负载则读负载) → 回调 → 读消息头 …，直到连接关闭
//! - 写流水线: 发送队列为空时挂起；有消息就按 FIFO 顺序逐条写出

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ConnectionError;
use crate::message::Message;
use crate::transport::{FrameReader, FrameWriter};

/// I/O 错误回调，两条流水线共享
pub type ErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// 对端连接句柄（应用线程持有）
///
/// 发送只是把消息投递到写流水线的队列，可在任意线程调用。
#[derive(Debug)]
pub struct Peer {
    outgoing: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
}

/// 尚未启动的读写流水线（I/O 线程持有）
pub struct PeerPipelines {
    outgoing: mpsc::UnboundedReceiver<Message>,
    closed: CancellationToken,
}

impl Peer {
    /// 创建连接句柄与待启动的流水线
    ///
    /// 启动之前发送的消息会保留在队列中，启动后依次写出。
    pub fn new() -> (Self, PeerPipelines) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        (
            Self {
                outgoing: tx,
                closed: closed.clone(),
            },
            PeerPipelines {
                outgoing: rx,
                closed,
            },
        )
    }

    /// 投递一条消息到发送队列；连接已关闭时丢弃
    pub fn send(&self, message: Message) {
        if self.closed.is_cancelled() {
            return;
        }
        let _ = self.outgoing.send(message);
    }

    /// 请求关闭连接（幂等）
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

impl PeerPipelines {
    /// 在 I/O 运行时上启动读写流水线
    ///
    /// `on_message` 在 I/O 线程上按到达顺序调用，返回 `Break` 时关闭连接。
    /// `on_error` 只在 I/O 失败时调用，主动关闭不会触发。
    pub fn start<F>(self, handle: &Handle, stream: TcpStream, on_message: F, on_error: ErrorCallback)
    where
        F: FnMut(Message) -> ControlFlow<()> + Send + 'static,
    {
        let (read_half, write_half) = stream.into_split();

        handle.spawn(read_loop(
            FrameReader::new(read_half),
            self.closed.clone(),
            on_message,
            on_error.clone(),
        ));
        handle.spawn(write_loop(
            FrameWriter::new(write_half),
            self.outgoing,
            self.closed,
            on_error,
        ));
    }
}

async fn read_loop<F>(
    mut reader: FrameReader<OwnedReadHalf>,
    closed: CancellationToken,
    mut on_message: F,
    on_error: ErrorCallback,
) where
    F: FnMut(Message) -> ControlFlow<()> + Send + 'static,
{
    loop {
        let result = tokio::select! {
            _ = closed.cancelled() => break,
            result = reader.read_message() => result,
        };

        match result {
            Ok(message) => {
                if on_message(message).is_break() {
                    closed.cancel();
                    break;
                }
            }
            Err(e) => {
                if !closed.is_cancelled() {
                    closed.cancel();
                    on_error(e);
                }
                break;
            }
        }
    }
}

async fn write_loop(
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    closed: CancellationToken,
    on_error: ErrorCallback,
) {
    loop {
        let message = tokio::select! {
            _ = closed.cancelled() => break,
            message = outgoing.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if let Err(e) = writer.write_message(&message).await {
            if !closed.is_cancelled() {
                closed.cancel();
                on_error(e);
            }
            return;
        }
    }

    closed.cancel();
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::net::TcpListener;

    use crate::queue::SyncQueue;
    use crate::transport::connect;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (client, accepted) = tokio::join!(connect("127.0.0.1", port), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    fn ignore_errors() -> ErrorCallback {
        Arc::new(|_: ConnectionError| {})
    }

    #[tokio::test]
    async fn test_messages_in_order() {
        let (a, b) = tcp_pair().await;
        let received = Arc::new(SyncQueue::new());

        let (sender, pipelines) = Peer::new();
        pipelines.start(&Handle::current(), a, |_| ControlFlow::Continue(()), ignore_errors());

        let (_receiver, pipelines) = Peer::new();
        let queue = received.clone();
        pipelines.start(
            &Handle::current(),
            b,
            move |message| {
                queue.push_back(message);
                ControlFlow::Continue(())
            },
            ignore_errors(),
        );

        for i in 0..50u16 {
            sender.send(Message::from_raw(i, vec![i as u8; i as usize]).unwrap());
        }

        wait_until(|| received.size() == 50).await;
        for i in 0..50u16 {
            assert_eq!(received.pop_front().unwrap().id(), i);
        }
    }

    #[tokio::test]
    async fn test_queued_before_start() {
        let (a, b) = tcp_pair().await;
        let received = Arc::new(SyncQueue::new());

        let (sender, pipelines) = Peer::new();
        sender.send(Message::new(7u16));

        let queue = received.clone();
        let (_receiver, receiver_pipelines) = Peer::new();
        receiver_pipelines.start(
            &Handle::current(),
            b,
            move |message| {
                queue.push_back(message);
                ControlFlow::Continue(())
            },
            ignore_errors(),
        );
        pipelines.start(&Handle::current(), a, |_| ControlFlow::Continue(()), ignore_errors());

        wait_until(|| received.size() == 1).await;
        assert_eq!(received.pop_front().unwrap().id(), 7);
    }

    #[tokio::test]
    async fn test_remote_close_reports_error() {
        let (a, b) = tcp_pair().await;
        let errors = Arc::new(Mutex::new(Vec::new()));

        let (peer, pipelines) = Peer::new();
        let sink = errors.clone();
        pipelines.start(
            &Handle::current(),
            a,
            |_| ControlFlow::Continue(()),
            Arc::new(move |e: ConnectionError| sink.lock().unwrap().push(e.to_string())),
        );

        drop(b);

        wait_until(|| !peer.is_open()).await;
        wait_until(|| !errors.lock().unwrap().is_empty()).await;
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_close_is_silent() {
        let (a, _b) = tcp_pair().await;
        let errors = Arc::new(Mutex::new(0));

        let (peer, pipelines) = Peer::new();
        let sink = errors.clone();
        pipelines.start(
            &Handle::current(),
            a,
            |_| ControlFlow::Continue(()),
            Arc::new(move |_: ConnectionError| *sink.lock().unwrap() += 1),
        );

        peer.close();
        peer.close();
        assert!(!peer.is_open());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*errors.lock().unwrap(), 0);
    }
}
