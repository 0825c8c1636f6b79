//! 测试配置管理
//!
//! 支持从多个源加载测试配置:
//! - 环境变量 (优先级最高)
//! - 配置文件 (TOML/YAML/JSON)
//! - 默认值 (优先级最低)
//!
//! 配置文件搜索路径 (按优先级):
//! 1. `ATP_TEST_CONFIG` 环境变量指定的路径
//! 2. `./test.toml` / `./test.yaml` / `./test.json` (当前目录)
//! 3. `~/.config/atp/test.toml` (用户配置目录)
//! 4. `/etc/atp/test.toml` (系统配置目录)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::device::{DeviceAccess, DeviceSpec};
use crate::merge::merge_values;
use crate::ConfigError;

/// 选择全部设备的特殊别名
pub const ALL_DEVICES: &str = "^all";

// ============================================
// 核心配置结构
// ============================================

/// 测试配置 (顶层)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// 环境配置
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// 设备清单 (别名 -> 设备)
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceSpec>,

    /// 默认等待参数
    #[serde(default)]
    pub wait: WaitConfig,

    /// 并发执行配置
    #[serde(default)]
    pub parallel: ParallelConfig,

    /// 其他自由格式的配置项
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 环境配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// 测试模式 (unit/integration/e2e)
    #[serde(default = "default_test_mode")]
    pub mode: String,

    /// 日志级别 (debug/info/warn/error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// 等待配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// 默认超时 (秒)
    #[serde(default = "default_wait_timeout")]
    pub timeout: u64,

    /// 默认轮询间隔 (毫秒)
    #[serde(default = "default_wait_interval_ms")]
    pub interval_ms: u64,
}

/// 并发执行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// 同时运行的宏线程上限
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

// ============================================
// 默认值函数
// ============================================

fn default_test_mode() -> String {
    "integration".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_wait_timeout() -> u64 {
    180
}
fn default_wait_interval_ms() -> u64 {
    1000
}
fn default_max_threads() -> usize {
    8
}

// ============================================
// Default 实现
// ============================================

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            mode: default_test_mode(),
            log_level: default_log_level(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: default_wait_timeout(),
            interval_ms: default_wait_interval_ms(),
        }
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
        }
    }
}

impl WaitConfig {
    /// 默认超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// 默认轮询间隔
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ============================================
// 配置加载实现
// ============================================

impl TestConfig {
    /// 从多个源加载配置 (优先级: 环境变量 > 配置文件 > 默认值)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file() {
            debug!("加载配置文件: {:?}", path);
            config = Self::load_from_file(&path)?;
        } else {
            debug!("未找到配置文件, 使用默认配置");
        }

        config.apply_env_vars()?;

        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config = match extension(path) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("解析 TOML 配置失败: {:?}", path))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 配置失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 配置失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        Ok(config)
    }

    /// 加载配置: 指定路径时只读该文件, 否则按搜索路径查找; 两种情况都应用环境变量
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let mut config = Self::load_from_file(path)?;
                config.apply_env_vars()?;
                Ok(config)
            }
            None => Self::load(),
        }
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("ATP_TEST_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
            warn!("ATP_TEST_CONFIG 指向的文件不存在: {:?}", p);
        }

        let mut candidates = vec![
            PathBuf::from("./test.toml"),
            PathBuf::from("./test.yaml"),
            PathBuf::from("./test.json"),
        ];

        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".config/atp/test.toml"));
            candidates.push(home.join(".config/atp/test.yaml"));
        }

        #[cfg(target_os = "linux")]
        {
            candidates.push(PathBuf::from("/etc/atp/test.toml"));
            candidates.push(PathBuf::from("/etc/atp/test.yaml"));
        }

        candidates.into_iter().find(|path| path.exists())
    }

    /// 从环境变量覆盖配置
    fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(mode) = env::var("ATP_TEST_MODE") {
            self.environment.mode = mode;
        }
        if let Ok(level) = env::var("ATP_LOG_LEVEL") {
            self.environment.log_level = level;
        }
        if let Ok(timeout) = env::var("ATP_WAIT_TIMEOUT") {
            self.wait.timeout = timeout.parse().context("无效的 ATP_WAIT_TIMEOUT")?;
        }
        if let Ok(interval) = env::var("ATP_WAIT_INTERVAL_MS") {
            self.wait.interval_ms = interval.parse().context("无效的 ATP_WAIT_INTERVAL_MS")?;
        }
        if let Ok(max_threads) = env::var("ATP_MAX_PARALLEL") {
            self.parallel.max_threads =
                max_threads.parse().context("无效的 ATP_MAX_PARALLEL")?;
        }

        Ok(())
    }

    /// 验证配置
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.wait.interval_ms == 0 {
            return Err(ConfigError::Invalid("wait.interval_ms 必须大于 0".to_string()));
        }
        if self.parallel.max_threads == 0 {
            return Err(ConfigError::Invalid(
                "parallel.max_threads 必须大于 0".to_string(),
            ));
        }

        for (alias, spec) in &self.devices {
            if spec.address.is_empty() {
                return Err(ConfigError::Invalid(format!("设备 {} 缺少地址", alias)));
            }
        }

        let defaults = self.devices.values().filter(|d| d.default).count();
        if defaults > 1 {
            return Err(ConfigError::Invalid(format!(
                "存在 {} 个默认设备, 最多只能有一个",
                defaults
            )));
        }

        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建目录失败: {:?}", parent))?;
        }

        let content = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).context("序列化 TOML 失败")?,
            Some("yaml") | Some("yml") => {
                serde_yaml::to_string(self).context("序列化 YAML 失败")?
            }
            Some("json") => serde_json::to_string_pretty(self).context("序列化 JSON 失败")?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        fs::write(path, content).with_context(|| format!("写入配置文件失败: {:?}", path))?;

        Ok(())
    }

    /// 深度合并覆盖项 (以 `$` 开头的键被忽略)
    pub fn merge(&mut self, overlay: serde_json::Value) -> Result<()> {
        let mut value = serde_json::to_value(&*self).context("序列化配置失败")?;
        merge_values(&mut value, overlay, Some("$"));
        *self = serde_json::from_value(value).context("合并后的配置无效")?;
        Ok(())
    }

    // ============================================
    // 设备访问
    // ============================================

    /// 默认设备别名
    ///
    /// 优先使用标记为 `default` 的设备; 只有一台设备时使用该设备。
    pub fn default_device_alias(&self) -> std::result::Result<&str, ConfigError> {
        if let Some((alias, _)) = self.devices.iter().find(|(_, spec)| spec.default) {
            return Ok(alias.as_str());
        }
        match self.devices.keys().next() {
            Some(alias) if self.devices.len() == 1 => Ok(alias.as_str()),
            _ => Err(ConfigError::NoDefaultDevice),
        }
    }

    /// 获取设备, `alias` 为 `None` 时返回默认设备
    pub fn get_device(&self, alias: Option<&str>) -> std::result::Result<DeviceAccess, ConfigError> {
        let alias = match alias {
            Some(alias) => alias,
            None => self.default_device_alias()?,
        };
        self.devices
            .get(alias)
            .map(|spec| DeviceAccess::from_spec(alias, spec))
            .ok_or_else(|| ConfigError::DeviceNotFound(alias.to_string()))
    }

    /// 按管理地址或被发现地址查找设备
    pub fn get_device_by_address(&self, address: &str) -> Option<DeviceAccess> {
        let found = self
            .all_devices()
            .into_iter()
            .find(|d| d.address == address || d.discover_address() == address);
        if found.is_none() {
            warn!("配置中未找到地址为 {} 的设备", address);
        }
        found
    }

    /// 所有设备
    pub fn all_devices(&self) -> Vec<DeviceAccess> {
        self.devices
            .iter()
            .map(|(alias, spec)| DeviceAccess::from_spec(alias, spec))
            .collect()
    }

    /// 展开设备列表, [`ALL_DEVICES`] 代表全部设备; 结果去重并保持顺序
    pub fn expand_devices<S: AsRef<str>>(
        &self,
        specs: &[S],
    ) -> std::result::Result<Vec<DeviceAccess>, ConfigError> {
        let mut seen = HashSet::new();
        let mut devices = Vec::new();

        for spec in specs {
            let batch = if spec.as_ref() == ALL_DEVICES {
                self.all_devices()
            } else {
                vec![self.get_device(Some(spec.as_ref()))?]
            };
            for device in batch {
                if seen.insert(device.alias.clone()) {
                    devices.push(device);
                }
            }
        }

        Ok(devices)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|s| s.to_str())
}
