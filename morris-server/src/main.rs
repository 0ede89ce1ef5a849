use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use morris_server::{daemon, logging, Configuration, Relay, CONFIGURATION_FILE};

/// 主循环频率约 60 Hz
const TICK: Duration = Duration::from_micros(16_667);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIGURATION_FILE));

    let (configuration, errors) = Configuration::load_or_default(&path);

    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    logging::init(&configuration, directory)?;

    for e in errors {
        error!("配置错误: {e}");
    }

    let shutdown = CancellationToken::new();
    daemon::install_shutdown_handler(shutdown.clone()).context("安装信号处理失败")?;

    let mut relay = Relay::new();
    relay.start(&configuration).context("启动服务端失败")?;

    daemon::notify_ready();

    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => relay.update(),
        }
    }

    daemon::notify_stopping();
    relay.stop();

    info!("服务端已正常关闭");

    Ok(())
}
