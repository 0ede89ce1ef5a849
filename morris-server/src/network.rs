//! 服务端网络层
//!
//! I/O 线程负责 accept 与所有连接的读写；应用线程每帧调用 `accept_connections`
//! 接管新连接，再从 `next_message` 取出收到的消息。连接断开只在应用线程上被
//! 发现（定期检查，或发送时发现已关闭），然后交给上层处理。

use std::net::{Ipv4Addr, SocketAddr};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use protocol::{ClientId, ConnectionError, IoThread, Message, Peer, PeerPipelines, SyncQueue};

use crate::error::ServerError;
use crate::id_pool::IdPool;

/// 收到的消息及其来源连接
pub type IncomingMessage = (Message, Arc<ClientConnection>);

/// 服务端持有的客户端连接
#[derive(Debug)]
pub struct ClientConnection {
    id: ClientId,
    addr: SocketAddr,
    peer: Peer,
}

impl ClientConnection {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 投递消息到发送队列
    pub fn send(&self, message: Message) {
        self.peer.send(message);
    }

    pub fn close(&self) {
        self.peer.close();
    }

    pub fn is_open(&self) -> bool {
        self.peer.is_open()
    }
}

#[cfg(test)]
impl ClientConnection {
    /// 没有套接字的连接，发出的消息被丢弃
    pub(crate) fn detached(id: ClientId) -> Arc<Self> {
        let (peer, _pipelines) = Peer::new();

        Arc::new(Self {
            id,
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            peer,
        })
    }
}

/// I/O 线程已接受、等待应用线程接管的连接
struct PendingConnection {
    connection: Arc<ClientConnection>,
    stream: TcpStream,
    pipelines: PeerPipelines,
}

/// 两个线程共享的状态
struct Shared {
    pool: Mutex<IdPool>,
    new_connections: SyncQueue<PendingConnection>,
    incoming: Arc<SyncQueue<IncomingMessage>>,
}

impl Shared {
    fn pool(&self) -> MutexGuard<'_, IdPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Running {
    io: IoThread,
    shared: Arc<Shared>,
    local_addr: SocketAddr,
}

/// 服务端网络门面
#[derive(Default)]
pub struct Server {
    running: Option<Running>,
    connections: Vec<Arc<ClientConnection>>,
    disconnected: Vec<Arc<ClientConnection>>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// 监听 `port`（IPv4 全部地址）并启动 I/O 线程
    ///
    /// 端口为 0 时由系统分配，返回实际监听的地址。
    pub fn start(&mut self, port: u16, max_clients: usize) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = std::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|source| ServerError::Bind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?;

        let io = IoThread::spawn("morris-server-io")?;

        // 监听套接字要注册到 I/O 线程的运行时上
        let listener = {
            let _guard = io.handle().enter();
            TcpListener::from_std(listener)
        }
        .map_err(|source| ServerError::Bind { port, source })?;

        let shared = Arc::new(Shared {
            pool: Mutex::new(IdPool::new(max_clients)),
            new_connections: SyncQueue::new(),
            incoming: Arc::new(SyncQueue::new()),
        });

        io.handle()
            .spawn(accept_loop(listener, shared.clone(), io.shutdown_token()));

        info!("服务端监听于 {local_addr}");

        self.running = Some(Running {
            io,
            shared,
            local_addr,
        });

        Ok(local_addr)
    }

    /// 关闭所有连接并停止 I/O 线程（幂等）
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        for connection in self.connections.drain(..) {
            connection.close();
        }
        self.disconnected.clear();

        running.io.stop();
        running.shared.new_connections.clear();
        running.shared.incoming.clear();

        info!("服务端已停止");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// 接管 I/O 线程新接受的连接并开始读取，返回接管的数量
    pub fn accept_connections(&mut self) -> usize {
        let Some(running) = &self.running else {
            return 0;
        };

        let pending = running.shared.new_connections.drain();
        let count = pending.len();

        for PendingConnection {
            connection,
            stream,
            pipelines,
        } in pending
        {
            start_communication(running.io.handle(), &running.shared, &connection, stream, pipelines);
            debug!("[{}] 客户端已连接", connection.id());
            self.connections.push(connection);
        }

        count
    }

    pub fn available_messages(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.shared.incoming.is_empty())
    }

    /// 取出下一条收到的消息
    pub fn next_message(&self) -> Option<IncomingMessage> {
        self.running.as_ref()?.shared.incoming.pop_front()
    }

    /// 发送消息；连接已关闭时按断开处理
    pub fn send_message(&mut self, connection: &Arc<ClientConnection>, message: Message) {
        if connection.is_open() {
            connection.send(message);
        } else {
            self.client_disconnected(connection);
        }
    }

    /// 发送给除 `except` 之外的所有连接
    pub fn send_message_broadcast(&mut self, message: &Message, except: Option<&Arc<ClientConnection>>) {
        let mut closed = Vec::new();

        for connection in &self.connections {
            if except.is_some_and(|except| Arc::ptr_eq(except, connection)) {
                continue;
            }

            if connection.is_open() {
                connection.send(message.clone());
            } else {
                closed.push(connection.clone());
            }
        }

        for connection in closed {
            self.client_disconnected(&connection);
        }
    }

    /// 找出已关闭的连接并按断开处理
    pub fn check_connections(&mut self) {
        let closed: Vec<_> = self
            .connections
            .iter()
            .filter(|connection| !connection.is_open())
            .cloned()
            .collect();

        for connection in closed {
            self.client_disconnected(&connection);
        }
    }

    /// 取出自上次调用以来断开的连接
    pub fn take_disconnected(&mut self) -> Vec<Arc<ClientConnection>> {
        std::mem::take(&mut self.disconnected)
    }

    /// 当前活动的连接数量
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // 同一连接只处理一次：不在活动列表中的直接忽略
    fn client_disconnected(&mut self, connection: &Arc<ClientConnection>) {
        let Some(index) = self
            .connections
            .iter()
            .position(|active| Arc::ptr_eq(active, connection))
        else {
            return;
        };

        let connection = self.connections.swap_remove(index);
        connection.close();

        if let Some(running) = &self.running {
            running.shared.pool().free(connection.id());
        }

        debug!("[{}] 客户端已断开", connection.id());
        self.disconnected.push(connection);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("接受连接失败: {e}");
                continue;
            }
        };

        info!("接受新连接: {addr}");

        let Some(id) = shared.pool().alloc() else {
            drop(stream);
            error!("拒绝来自 {addr} 的连接: 客户端 ID 已用完");
            continue;
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("[{id}] 设置 TCP_NODELAY 失败: {e}");
        }

        let (peer, pipelines) = Peer::new();
        shared.new_connections.push_back(PendingConnection {
            connection: Arc::new(ClientConnection { id, addr, peer }),
            stream,
            pipelines,
        });
    }
}

fn start_communication(
    handle: &Handle,
    shared: &Shared,
    connection: &Arc<ClientConnection>,
    stream: TcpStream,
    pipelines: PeerPipelines,
) {
    let id = connection.id();
    let weak: Weak<ClientConnection> = Arc::downgrade(connection);
    let incoming = shared.incoming.clone();

    pipelines.start(
        handle,
        stream,
        move |message| match weak.upgrade() {
            Some(connection) => {
                incoming.push_back((message, connection));
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        },
        Arc::new(move |e: ConnectionError| error!("[{id}] 连接错误: {e}")),
    );
}
