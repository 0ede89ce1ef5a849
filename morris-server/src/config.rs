//! 服务端配置文件
//!
//! JSON 格式，缺少的字段取默认值。

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use protocol::DEFAULT_PORT;

use crate::error::ConfigurationError;

/// 默认配置文件名
pub const CONFIGURATION_FILE: &str = "server_configuration.json";

/// 周期任务的合法间隔（秒）
const PERIOD_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

/// 日志输出目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    None,
    Console,
    File,
    Both,
}

impl LogTarget {
    pub fn console(self) -> bool {
        matches!(self, Self::Console | Self::Both)
    }

    pub fn file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Err,
    Critical,
    Off,
}

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub port: u16,
    pub max_clients: u32,
    /// 回收空会话的间隔（秒）
    pub session_collect_period: u64,
    /// 检查断开连接的间隔（秒）
    pub connection_check_period: u64,
    pub log_target: LogTarget,
    pub log_level: LogLevel,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_clients: 65535,
            session_collect_period: 15,
            connection_check_period: 5,
            log_target: LogTarget::Both,
            log_level: LogLevel::Info,
        }
    }
}

impl Configuration {
    /// 读取并校验配置文件
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path)?;
        let configuration: Self = serde_json::from_str(&content)?;
        configuration.validate()?;

        Ok(configuration)
    }

    /// 写入配置文件
    pub fn save(&self, path: &Path) -> Result<(), ConfigurationError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// 检查字段取值
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !PERIOD_RANGE.contains(&self.session_collect_period) {
            return Err(ConfigurationError::InvalidValue {
                field: "session_collect_period",
                value: self.session_collect_period.to_string(),
            });
        }

        if !PERIOD_RANGE.contains(&self.connection_check_period) {
            return Err(ConfigurationError::InvalidValue {
                field: "connection_check_period",
                value: self.connection_check_period.to_string(),
            });
        }

        if self.max_clients == 0 || self.max_clients > u32::from(u16::MAX) + 1 {
            return Err(ConfigurationError::InvalidValue {
                field: "max_clients",
                value: self.max_clients.to_string(),
            });
        }

        Ok(())
    }

    /// 读取配置；失败时使用默认配置并重写文件
    ///
    /// 返回的错误只用于记录日志（此时日志系统可能尚未初始化）。
    pub fn load_or_default(path: &Path) -> (Self, Vec<ConfigurationError>) {
        match Self::load(path) {
            Ok(configuration) => (configuration, Vec::new()),
            Err(load_error) => {
                let configuration = Self::default();
                let mut errors = vec![load_error];

                if let Err(save_error) = configuration.save(path) {
                    errors.push(save_error);
                }

                (configuration, errors)
            }
        }
    }

    pub fn session_collect_period(&self) -> Duration {
        Duration::from_secs(self.session_collect_period)
    }

    pub fn connection_check_period(&self) -> Duration {
        Duration::from_secs(self.connection_check_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIGURATION_FILE);
        fs::write(&path, r#"{ "port": 9000, "log_level": "err" }"#).unwrap();

        let configuration = Configuration::load(&path).unwrap();
        assert_eq!(configuration.port, 9000);
        assert_eq!(configuration.log_level, LogLevel::Err);
        assert_eq!(configuration.max_clients, 65535);
        assert_eq!(configuration.log_target, LogTarget::Both);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIGURATION_FILE);

        let configuration = Configuration {
            port: 1234,
            log_target: LogTarget::File,
            ..Default::default()
        };
        configuration.save(&path).unwrap();

        assert_eq!(Configuration::load(&path).unwrap(), configuration);
    }

    #[test]
    fn test_invalid_period() {
        let configuration = Configuration {
            session_collect_period: 0,
            ..Default::default()
        };
        assert!(matches!(
            configuration.validate(),
            Err(ConfigurationError::InvalidValue { field: "session_collect_period", .. })
        ));

        let configuration = Configuration {
            connection_check_period: 61,
            ..Default::default()
        };
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn test_unknown_log_target_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIGURATION_FILE);
        fs::write(&path, r#"{ "log_target": "syslog" }"#).unwrap();

        assert!(matches!(Configuration::load(&path), Err(ConfigurationError::Json(_))));
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIGURATION_FILE);

        let (configuration, errors) = Configuration::load_or_default(&path);
        assert_eq!(configuration, Configuration::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigurationError::Io(_)));

        // 重写后的文件可以正常读取
        assert_eq!(Configuration::load(&path).unwrap(), Configuration::default());
    }

    #[test]
    fn test_invalid_file_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIGURATION_FILE);
        fs::write(&path, r#"{ "session_collect_period": 600 }"#).unwrap();

        let (configuration, errors) = Configuration::load_or_default(&path);
        assert_eq!(configuration, Configuration::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(Configuration::load(&path).unwrap(), Configuration::default());
    }

    #[test]
    fn test_rewrite_failure_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join(CONFIGURATION_FILE);

        let (configuration, errors) = Configuration::load_or_default(&path);
        assert_eq!(configuration, Configuration::default());
        assert_eq!(errors.len(), 2);
    }
}
