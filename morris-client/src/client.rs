//! 客户端门面

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use protocol::{IoThread, Message, MessageId, SyncQueue};

use crate::connection::{ErrorSlot, ServerConnection};
use crate::error::ClientError;

/// 联机客户端
///
/// 应用线程持有；每次 `connect` 启动一个新的 I/O 线程，`disconnect` 时停止。
pub struct Client {
    io: Option<IoThread>,
    connection: Option<ServerConnection>,
    incoming: Arc<SyncQueue<Message>>,
    error: ErrorSlot,
}

impl Client {
    pub fn new() -> Self {
        Self {
            io: None,
            connection: None,
            incoming: Arc::new(SyncQueue::new()),
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// 开始连接服务端（异步完成，用 `connection_established` 轮询）
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        self.disconnect();
        self.take_error();

        let io = IoThread::spawn("morris-client-io")?;
        self.connection = Some(ServerConnection::connect(
            io.handle(),
            host,
            port,
            self.incoming.clone(),
            self.error.clone(),
        ));
        self.io = Some(io);

        Ok(())
    }

    /// 关闭连接并停止 I/O 线程，丢弃未读的消息（幂等）
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }

        if let Some(mut io) = self.io.take() {
            io.stop();
        }

        self.incoming.clear();
    }

    /// 连接是否已建立；I/O 线程上发生过错误时返回该错误并断开
    pub fn connection_established(&mut self) -> Result<bool, ClientError> {
        self.throw_if_error()?;

        Ok(self
            .connection
            .as_ref()
            .is_some_and(ServerConnection::connection_established))
    }

    pub fn available_messages(&self) -> bool {
        !self.incoming.is_empty()
    }

    pub fn next_message(&self) -> Option<Message> {
        self.incoming.pop_front()
    }

    /// 发送消息；未连接时什么也不做
    pub fn send_message(&mut self, message: Message) -> Result<(), ClientError> {
        self.throw_if_error()?;

        if let Some(connection) = &self.connection {
            connection.send(message);
        }

        Ok(())
    }

    /// 序列化负载并发送
    pub fn send<T: Serialize>(&mut self, id: MessageId, payload: &T) -> Result<(), ClientError> {
        let message = Message::with_payload(id, payload)?;
        self.send_message(message)
    }

    /// 取出 I/O 线程上发生的错误；有错误时先断开
    pub fn throw_if_error(&mut self) -> Result<(), ClientError> {
        match self.take_error() {
            Some(e) => {
                self.disconnect();
                Err(e.into())
            }
            None => Ok(()),
        }
    }

    fn take_error(&self) -> Option<protocol::ConnectionError> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
