//! 进程生命周期：退出信号与服务管理器通知

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 安装退出信号处理：收到信号时取消 `shutdown`
///
/// 发布版监听 SIGTERM，调试版监听 SIGINT（方便在终端里 Ctrl-C）。
#[cfg(unix)]
pub fn install_shutdown_handler(shutdown: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let (kind, name) = if cfg!(debug_assertions) {
        (SignalKind::interrupt(), "SIGINT")
    } else {
        (SignalKind::terminate(), "SIGTERM")
    };

    let mut signal = signal(kind)?;

    tokio::spawn(async move {
        if signal.recv().await.is_some() {
            info!("收到 {name}，正在关闭");
        }
        shutdown.cancel();
    });

    Ok(())
}

#[cfg(not(unix))]
pub fn install_shutdown_handler(shutdown: CancellationToken) -> std::io::Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl-C，正在关闭"),
            Err(e) => warn!("信号处理失败: {e}"),
        }
        shutdown.cancel();
    });

    Ok(())
}

/// 通知服务管理器已就绪
pub fn notify_ready() {
    notify("READY=1");
}

/// 通知服务管理器正在停止
pub fn notify_stopping() {
    notify("STOPPING=1");
}

/// 写入 `$NOTIFY_SOCKET`；没有设置时什么也不做
#[cfg(unix)]
fn notify(state: &str) {
    use std::os::unix::net::UnixDatagram;

    let Some(path) = std::env::var_os("NOTIFY_SOCKET") else {
        return;
    };

    let result = UnixDatagram::unbound().and_then(|socket| {
        let bytes = path.as_encoded_bytes();

        match bytes.strip_prefix(b"@") {
            #[cfg(target_os = "linux")]
            Some(name) => {
                use std::os::linux::net::SocketAddrExt;
                use std::os::unix::net::SocketAddr;

                let address = SocketAddr::from_abstract_name(name)?;
                socket.send_to_addr(state.as_bytes(), &address)
            }
            _ => socket.send_to(state.as_bytes(), &path),
        }
    });

    match result {
        Ok(_) => debug!("已通知服务管理器: {state}"),
        Err(e) => warn!("通知服务管理器失败: {e}"),
    }
}

#[cfg(not(unix))]
fn notify(_state: &str) {}
