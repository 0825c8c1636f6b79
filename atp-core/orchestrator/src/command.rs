//! 命令生命周期
//!
//! 每个远端操作都实现 [`Command`]，由编排器按固定顺序驱动：
//!
//! ```text
//! Created -> Prepared -> Executed -> (Reverted)? -> Released
//! ```
//!
//! - `prepare`: 获取执行所需的资源（如打开连接）
//! - `execute`: 执行远端操作并返回结果，通常在这里调用轮询原语等待远端状态变化
//! - `undo`: 补偿操作，撤销一次成功的 `execute`；远端可能已不是执行后的状态，
//!   “没有可撤销的内容”不算错误
//! - `release`: 无条件释放 `prepare` 获取的资源，每个命令恰好调用一次
//!
//! 命令自身从不调用这些方法，只有编排器（[`crate::Macro`] 或 [`run_command`]）会调用。

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use atp_polling::Poller;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CommandError, Result};

/// 远端操作
pub trait Command: Send {
    /// 执行结果
    type Output: fmt::Debug;

    /// 命令名称，用于日志和报告
    fn name(&self) -> String {
        short_type_name::<Self>().to_string()
    }

    /// 获取资源
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// 执行远端操作
    fn execute(&mut self) -> Result<Self::Output>;

    /// 撤销已成功执行的操作
    fn undo(&mut self) -> Result<()> {
        Ok(())
    }

    /// 释放资源
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 命令生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    /// 已添加到宏，尚未准备
    Created,
    /// 资源已准备
    Prepared,
    /// 已成功执行
    Executed,
    /// 已撤销
    Reverted,
    /// 资源已释放
    Released,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "已创建",
            Self::Prepared => "已准备",
            Self::Executed => "已执行",
            Self::Reverted => "已撤销",
            Self::Released => "已释放",
        };
        write!(f, "{}", name)
    }
}

/// 单独执行一个命令 (prepare -> execute -> release)
///
/// 不在宏中时没有回滚：失败的命令只会被释放。`release` 的失败只记录日志，
/// 不会覆盖执行结果或执行错误。
pub fn run_command<C: Command + ?Sized>(command: &mut C) -> Result<C::Output> {
    let name = Command::name(command);
    debug!("执行命令: {}", name);

    let outcome = guarded(|| {
        Command::prepare(&mut *command)?;
        Command::execute(&mut *command)
    });

    if let Err(e) = guarded(|| Command::release(&mut *command)) {
        warn!("命令 {} 释放资源失败: {}", name, e);
    }

    outcome
}

/// 反复完整执行命令直到结果满足条件
///
/// 每次探测都是一次完整的 [`run_command`]（prepare -> execute -> release），
/// 适合每次都需要重新建立连接的命令。执行错误立即返回，
/// 超时转换为 [`CommandError::WaitTimedOut`]。
pub fn run_wait<C: Command + ?Sized>(
    command: &mut C,
    poller: &Poller<'_, C::Output>,
) -> Result<C::Output> {
    debug!("轮询命令: {}", Command::name(command));
    poller.try_wait(|| run_command(command))
}

/// 宏内部使用的类型擦除命令
pub(crate) trait Step: Send {
    fn prepare(&mut self) -> Result<()>;
    fn execute(&mut self) -> Result<String>;
    fn undo(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// 报告中保留的输出长度上限
const MAX_OUTPUT_LEN: usize = 512;

impl<C: Command> Step for C {
    fn prepare(&mut self) -> Result<()> {
        Command::prepare(self)
    }

    fn execute(&mut self) -> Result<String> {
        let output = Command::execute(self)?;
        let mut rendered = format!("{:?}", output);
        if rendered.len() > MAX_OUTPUT_LEN {
            let mut end = MAX_OUTPUT_LEN;
            while !rendered.is_char_boundary(end) {
                end -= 1;
            }
            rendered.truncate(end);
            rendered.push_str("...");
        }
        Ok(rendered)
    }

    fn undo(&mut self) -> Result<()> {
        Command::undo(self)
    }

    fn release(&mut self) -> Result<()> {
        Command::release(self)
    }
}

/// panic 发生的位置与调用栈
///
/// 调用栈遵循 `RUST_BACKTRACE`，未开启时为 "disabled backtrace"。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicTrace {
    pub location: Option<String>,
    pub backtrace: String,
}

impl fmt::Display for PanicTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "位于 {}\n{}", location, self.backtrace),
            None => write!(f, "{}", self.backtrace),
        }
    }
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicTrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// 安装记录 panic 位置的钩子，原有钩子照常调用
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = PanicTrace {
                location: info.location().map(|l| l.to_string()),
                backtrace: Backtrace::capture().to_string(),
            };
            let _ = LAST_PANIC.try_with(|last| {
                if let Ok(mut slot) = last.try_borrow_mut() {
                    *slot = Some(trace);
                }
            });
            previous(info);
        }));
    });
}

/// 取出当前线程最近一次 panic 的位置
pub(crate) fn take_last_panic() -> Option<PanicTrace> {
    LAST_PANIC
        .try_with(|last| last.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
}

/// 调用命令的某个阶段，把 panic 转换为 [`CommandError::Panicked`]
pub(crate) fn guarded<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    install_panic_hook();
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(CommandError::Panicked(panic_message(payload.as_ref()))))
}

/// 提取 panic 信息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知 panic".to_string()
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Echo {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_execute: bool,
    }

    impl Command for Echo {
        type Output = u32;

        fn prepare(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("prepare");
            Ok(())
        }

        fn execute(&mut self) -> Result<u32> {
            self.calls.lock().unwrap().push("execute");
            if self.fail_execute {
                return Err(CommandError::ExecutionFailed("boom".to_string()));
            }
            Ok(42)
        }

        fn undo(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("undo");
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("release");
            Ok(())
        }
    }

    struct Panicky;

    impl Command for Panicky {
        type Output = ();

        fn execute(&mut self) -> Result<()> {
            panic!("remote exploded");
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        let cmd = Echo {
            calls: Arc::default(),
            fail_execute: false,
        };
        assert_eq!(Command::name(&cmd), "Echo");
    }

    #[test]
    fn test_run_command_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut cmd = Echo {
            calls: calls.clone(),
            fail_execute: false,
        };

        assert_eq!(run_command(&mut cmd).unwrap(), 42);
        assert_eq!(*calls.lock().unwrap(), vec!["prepare", "execute", "release"]);
    }

    #[test]
    fn test_run_command_failure_still_releases_without_undo() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut cmd = Echo {
            calls: calls.clone(),
            fail_execute: true,
        };

        let err = run_command(&mut cmd).unwrap_err();
        assert!(matches!(err, CommandError::ExecutionFailed(_)));
        assert_eq!(*calls.lock().unwrap(), vec!["prepare", "execute", "release"]);
    }

    #[test]
    fn test_panic_becomes_error() {
        let err = run_command(&mut Panicky).unwrap_err();
        match err {
            CommandError::Panicked(msg) => assert_eq!(msg, "remote exploded"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_step_output_is_truncated() {
        struct Big;
        impl Command for Big {
            type Output = String;
            fn execute(&mut self) -> Result<String> {
                Ok("x".repeat(2000))
            }
        }

        let rendered = Step::execute(&mut Big).unwrap();
        assert!(rendered.len() <= MAX_OUTPUT_LEN + 3);
        assert!(rendered.ends_with("..."));
    }

    #[test]
    fn test_panic_location_is_recorded() {
        let _ = take_last_panic();
        let _ = run_command(&mut Panicky);

        let trace = take_last_panic().unwrap();
        assert!(trace.location.unwrap().contains("command.rs"));
        assert!(take_last_panic().is_none());
    }

    #[test]
    fn test_run_wait_runs_full_lifecycle_per_attempt() {
        struct Flaky {
            calls: Arc<Mutex<Vec<&'static str>>>,
            attempts: u32,
        }

        impl Command for Flaky {
            type Output = u32;

            fn prepare(&mut self) -> Result<()> {
                self.calls.lock().unwrap().push("prepare");
                Ok(())
            }

            fn execute(&mut self) -> Result<u32> {
                self.attempts += 1;
                Ok(self.attempts)
            }

            fn release(&mut self) -> Result<()> {
                self.calls.lock().unwrap().push("release");
                Ok(())
            }
        }

        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut cmd = Flaky {
            calls: calls.clone(),
            attempts: 0,
        };
        let poller = Poller::new()
            .condition(|n: &u32| *n >= 2)
            .interval(std::time::Duration::from_millis(1));

        assert_eq!(run_wait(&mut cmd, &poller).unwrap(), 2);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["prepare", "release", "prepare", "release"]
        );
    }

    #[test]
    fn test_run_wait_timeout_keeps_last_output() {
        let mut cmd = Echo {
            calls: Arc::default(),
            fail_execute: false,
        };
        let poller = Poller::new()
            .condition(|n: &u32| *n == 0)
            .timeout(std::time::Duration::ZERO)
            .interval(std::time::Duration::from_millis(1));

        match run_wait(&mut cmd, &poller).unwrap_err() {
            CommandError::WaitTimedOut(msg) => assert!(msg.contains("42")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_wait_stops_on_execution_error() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut cmd = Echo {
            calls: calls.clone(),
            fail_execute: true,
        };
        let poller = Poller::new()
            .condition(|_: &u32| false)
            .interval(std::time::Duration::from_millis(1));

        let err = run_wait(&mut cmd, &poller).unwrap_err();
        assert!(matches!(err, CommandError::ExecutionFailed(_)));
        assert_eq!(*calls.lock().unwrap(), vec!["prepare", "execute", "release"]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CommandState::Released.to_string(), "已释放");
    }
}
