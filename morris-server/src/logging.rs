//! 日志初始化

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Configuration, LogLevel};

/// 日志文件名（与配置文件位于同一目录）
pub const LOG_FILE: &str = "server.log";

/// 按配置安装全局日志订阅器
///
/// `RUST_LOG` 作为基础过滤规则，配置中的级别作为默认级别。
pub fn init(configuration: &Configuration, directory: &Path) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(level_filter(configuration.log_level).into());

    let console = configuration
        .log_target
        .console()
        .then(|| fmt::layer().with_target(false));

    let file = if configuration.log_target.file() {
        let path = directory.join(LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("打开日志文件 {path:?} 失败"))?;

        Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("初始化日志失败")?;

    Ok(())
}

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Err | LogLevel::Critical => LevelFilter::ERROR,
        LogLevel::Off => LevelFilter::OFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(LogLevel::Debug), LevelFilter::DEBUG);
        assert_eq!(level_filter(LogLevel::Err), LevelFilter::ERROR);
        assert_eq!(level_filter(LogLevel::Critical), LevelFilter::ERROR);
        assert_eq!(level_filter(LogLevel::Off), LevelFilter::OFF);
    }
}
