//! 九子棋中继服务端
//!
//! 包含:
//! - 客户端 / 会话 ID 分配
//! - 协作式任务调度
//! - 网络层门面
//! - 对局会话与消息路由
//! - 配置文件、日志、进程生命周期

pub mod config;
pub mod daemon;
pub mod error;
pub mod id_pool;
pub mod logging;
pub mod network;
pub mod server;
pub mod session;
pub mod session_pool;
pub mod task;

pub use config::{Configuration, LogLevel, LogTarget, CONFIGURATION_FILE};
pub use error::{ConfigurationError, ServerError};
pub use id_pool::IdPool;
pub use network::{ClientConnection, IncomingMessage, Server};
pub use server::{Relay, RelayState};
pub use session::{GameSession, Slot};
pub use session_pool::SessionPool;
pub use task::{TaskManager, TaskResult};
