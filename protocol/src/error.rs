//! 错误类型定义

use thiserror::Error;

/// 连接错误（套接字 I/O 失败）
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 地址解析失败
    #[error("Could not resolve `{addr}`")]
    Resolve { addr: String },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O 线程启动失败
    #[error("Could not start the I/O thread: {0}")]
    Runtime(std::io::Error),
}

/// 序列化错误（负载无法编码或解码）
#[derive(Error, Debug)]
pub enum SerializationError {
    /// bincode 编解码错误
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// 负载超出 u16 长度限制
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
