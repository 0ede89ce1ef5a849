//! 协议常量定义

use std::time::Duration;

/// 服务端默认端口
pub const DEFAULT_PORT: u16 = 7915;

/// 消息头大小: 2 字节消息 ID + 2 字节负载长度
pub const HEADER_SIZE: usize = 4;

/// 单条消息负载的最大长度（负载长度字段为 u16）
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// 聊天消息最大长度（字节）
pub const MAX_CHAT_MESSAGE_SIZE: usize = 128;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
