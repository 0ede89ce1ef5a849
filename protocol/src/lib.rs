//! 九子棋联机共享协议库
//!
//! 包含:
//! - 消息信封与帧格式 (Message, Header)
//! - 消息类型与负载定义 (MessageId, 各负载结构体)
//! - 线程安全队列 (SyncQueue)
//! - 帧编解码 (FrameReader, FrameWriter)
//! - 通用对端连接 (Peer)
//! - 后台 I/O 线程 (IoThread)

mod connection;
mod constants;
mod error;
mod message;
pub mod payload;
mod queue;
mod runtime;
mod transport;

pub use connection::{ErrorCallback, Peer, PeerPipelines};
pub use constants::*;
pub use error::{ConnectionError, SerializationError};
pub use message::{Header, Message};
pub use payload::{ClientId, ClockTime, ErrorCode, GameMode, MessageId, Player, SessionId};
pub use queue::SyncQueue;
pub use runtime::IoThread;
pub use transport::{connect, FrameReader, FrameWriter};
