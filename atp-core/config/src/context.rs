//! 线程私有的当前配置
//!
//! 每个线程持有自己的配置快照。并行执行的宏在启动时安装共享配置的深拷贝，
//! 此后对配置的修改只在本线程可见。

use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::debug;

use crate::test_config::TestConfig;
use crate::{ConfigError, Result};

thread_local! {
    static CURRENT: RefCell<Option<TestConfig>> = const { RefCell::new(None) };
}

/// 配置安装守卫
///
/// 离开作用域时恢复安装前的配置。守卫绑定在安装它的线程上，不能跨线程移动。
#[must_use = "守卫被丢弃时会立即恢复之前的配置"]
pub struct ConfigGuard {
    previous: Option<TestConfig>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// 将配置安装为当前线程的当前配置
pub fn install(config: TestConfig) -> ConfigGuard {
    debug!(
        "安装线程配置: {:?} ({} 台设备)",
        std::thread::current().name(),
        config.devices.len()
    );
    let previous = CURRENT.with(|current| current.replace(Some(config)));
    ConfigGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// 当前线程是否已安装配置
pub fn is_installed() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// 当前配置的副本
pub fn current() -> Result<TestConfig> {
    with_current(TestConfig::clone)
}

/// 以只读方式访问当前配置
pub fn with_current<R>(f: impl FnOnce(&TestConfig) -> R) -> Result<R> {
    CURRENT.with(|current| {
        let current = current.borrow();
        current.as_ref().map(f).ok_or(ConfigError::NotLoaded)
    })
}

/// 修改当前配置（仅对本线程可见）
///
/// 回调内不能再次访问当前配置。
pub fn with_current_mut<R>(f: impl FnOnce(&mut TestConfig) -> R) -> Result<R> {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        current.as_mut().map(f).ok_or(ConfigError::NotLoaded)
    })
}
