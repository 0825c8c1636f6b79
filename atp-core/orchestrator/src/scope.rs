//! 作用域命令
//!
//! 端口转发、抓包这类命令在 `execute` 后需要保持运行，直到调用方完成
//! 依赖它的操作。[`CommandScope`] 进入时执行 prepare + execute，
//! 离开作用域（或显式 [`CommandScope::close`]）时释放资源。

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::command::{guarded, Command};
use crate::Result;

/// 持有一个已执行命令的资源，drop 时释放
pub struct CommandScope<C: Command> {
    command: C,
    output: C::Output,
    released: bool,
}

impl<C: Command> CommandScope<C> {
    /// 准备并执行命令
    ///
    /// 任一阶段失败时资源立即释放，返回原始错误。
    pub fn enter(mut command: C) -> Result<Self> {
        debug!("进入命令作用域: {}", command.name());

        let outcome = guarded(|| {
            command.prepare()?;
            command.execute()
        });

        match outcome {
            Ok(output) => Ok(Self {
                command,
                output,
                released: false,
            }),
            Err(e) => {
                if let Err(release_err) = guarded(|| command.release()) {
                    warn!("命令 {} 释放资源失败: {}", command.name(), release_err);
                }
                Err(e)
            }
        }
    }

    /// `execute` 的结果
    pub fn output(&self) -> &C::Output {
        &self.output
    }

    /// 立即释放资源并返回释放结果
    pub fn close(mut self) -> Result<()> {
        self.released = true;
        guarded(|| self.command.release())
    }
}

impl<C: Command> Deref for CommandScope<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.command
    }
}

impl<C: Command> DerefMut for CommandScope<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.command
    }
}

impl<C: Command> Drop for CommandScope<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!("离开命令作用域: {}", self.command.name());
        if let Err(e) = guarded(|| self.command.release()) {
            warn!("命令 {} 释放资源失败: {}", self.command.name(), e);
        }
    }
}
