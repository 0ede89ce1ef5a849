//! 服务端错误类型

use thiserror::Error;

use protocol::ConnectionError;

/// 网络层错误
#[derive(Error, Debug)]
pub enum ServerError {
    /// 无法监听端口
    #[error("Could not bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// I/O 线程启动失败
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// 服务已在运行
    #[error("Server is already running")]
    AlreadyRunning,
}

/// 配置文件错误
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Could not access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),

    /// 字段取值不合法
    #[error("Invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },
}
