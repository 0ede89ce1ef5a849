//! 客户端错误类型

use thiserror::Error;

use protocol::{ConnectionError, SerializationError};

#[derive(Error, Debug)]
pub enum ClientError {
    /// 连接失败或中断
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// 负载无法编码
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
