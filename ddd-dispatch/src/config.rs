//! 分发配置（DispatchConfig）
//!
//! 合并顺序（后者覆盖前者）：
//! 1. `DispatchConfig::default()`；
//! 2. TOML 配置文件（存在时）；
//! 3. 以 `DISPATCH_` 为前缀的环境变量，`__` 表示嵌套，例如 `DISPATCH_POLLER__PERIOD=500`。
//!
//! 所有时长均以毫秒表示。
//!
use crate::{
    error::{DispatchError, DispatchResult},
    outbox::{OutboxPublisherConfig, PollerConfig, RetryPolicy},
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ENV_PREFIX: &str = "DISPATCH_";
pub const DEFAULT_CHANNEL: &str = "local";
/// 投递延迟与退避的上限
pub const MAX_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// 事件类型到通道名的路由表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub default_channel: String,
    /// event_type -> channel
    pub routes: BTreeMap<String, String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_channel: DEFAULT_CHANNEL.to_string(),
            routes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub router: RouterConfig,
    pub outbox: OutboxPublisherConfig,
    pub poller: PollerConfig,
    pub retry: RetryPolicy,
    /// 不受事务推迟约束的事件类型
    pub pass_through: Vec<String>,
}

impl DispatchConfig {
    pub fn pass_through_set(&self) -> HashSet<String> {
        self.pass_through.iter().cloned().collect()
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.router.default_channel.is_empty() {
            return Err(DispatchError::Config {
                reason: "router.default_channel must not be empty".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(DispatchError::Config {
                reason: "retry.max_attempts must be at least 1".into(),
            });
        }
        check_delay("outbox.min_delay", self.outbox.min_delay)?;
        check_delay("retry.initial_backoff", self.retry.initial_backoff)?;
        check_delay("retry.max_backoff", self.retry.max_backoff)?;
        self.poller.validate()
    }
}

pub(crate) fn check_delay(name: &str, delay: Duration) -> DispatchResult<()> {
    if delay > MAX_DELAY {
        return Err(DispatchError::Config {
            reason: format!(
                "{name} must not exceed {}ms, got {}ms",
                MAX_DELAY.as_millis(),
                delay.as_millis()
            ),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn load(&self) -> DispatchResult<DispatchConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(DispatchConfig::default()));

        if let Some(path) = &self.config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
                debug!(path = %path.display(), "dispatch config file loaded");
            } else {
                debug!(path = %path.display(), "dispatch config file not found, skipped");
            }
        }

        self.finish(figment)
    }

    /// 以内联 TOML 代替配置文件
    pub fn load_from_str(&self, toml: &str) -> DispatchResult<DispatchConfig> {
        let figment = Figment::new()
            .merge(Serialized::defaults(DispatchConfig::default()))
            .merge(Toml::string(toml));
        self.finish(figment)
    }

    fn finish(&self, figment: Figment) -> DispatchResult<DispatchConfig> {
        let config: DispatchConfig = figment
            .merge(Env::prefixed(&self.env_prefix).split("__"))
            .extract()?;
        config.validate()?;

        info!(
            default_channel = %config.router.default_channel,
            routes = config.router.routes.len(),
            outbox_mode = ?config.outbox.mode,
            "dispatch configuration loaded"
        );
        Ok(config)
    }
}

/// `Duration` 与毫秒整数之间的 serde 转换
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
