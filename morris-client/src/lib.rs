//! 九子棋联机客户端
//!
//! 游戏主循环每帧轮询 `Client`：检查连接状态、取出收到的消息、发送消息。
//! 所有网络 I/O 在后台线程上完成，I/O 错误在下一次轮询时返回。

mod client;
mod connection;
mod error;

pub use client::Client;
pub use connection::ServerConnection;
pub use error::ClientError;
