//! ATP 测试配置
//!
//! - [`TestConfig`]: 测试配置（环境、设备清单、等待与并发参数），支持 TOML/YAML/JSON
//! - [`DeviceAccess`]: 从设备清单解析出的设备访问信息（地址、凭据）
//! - 线程私有的“当前配置”：[`install`] / [`current`] / [`with_current`]
//!
//! 配置在概念上是进程级共享的，但每个并行执行的宏都会安装自己的深拷贝快照，
//! 因此线程之间不会看到彼此对配置的修改。

pub mod context;
pub mod device;
pub mod merge;
pub mod test_config;

pub use context::{current, install, is_installed, with_current, with_current_mut, ConfigGuard};
pub use device::{Credential, CredentialSpec, DeviceAccess, DeviceSpec, Keyset};
pub use merge::merge_values;
pub use test_config::{EnvironmentConfig, ParallelConfig, TestConfig, WaitConfig, ALL_DEVICES};

use thiserror::Error;

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("当前线程未安装配置")]
    NotLoaded,

    #[error("设备 {0} 不存在")]
    DeviceNotFound(String),

    #[error("未指定默认设备")]
    NoDefaultDevice,

    #[error("配置无效: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
