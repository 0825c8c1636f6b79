//! ATP 编排器
//!
//! 所有远端命令与宏共享的执行基础：
//! - [`Command`]: 四阶段命令生命周期 (prepare / execute / undo / release)
//! - [`Macro`]: 有序命令组合，失败时按完成顺序的逆序自动补偿
//! - [`MacroThread`] / [`ParallelRunner`]: 在独立线程上并行执行多个宏，
//!   每个线程使用配置的私有深拷贝，失败统一汇总到结果通道
//! - [`run_wait`] / [`Cached`] / [`CommandScope`]: 轮询执行、结果缓存、
//!   作用域内保持运行的命令

pub mod cache;
pub mod command;
pub mod macros;
pub mod report;
pub mod scope;
pub mod thread;

pub use cache::{Cached, CommandCache};
pub use command::{run_command, run_wait, Command, CommandState, PanicTrace};
pub use macros::Macro;
pub use report::{FailurePhase, MacroReport, SecondaryFailure, StepResult, StepStatus};
pub use scope::CommandScope;
pub use thread::{MacroThread, ParallelReport, ParallelRunner, ThreadFailure};

use std::fmt;

use atp_config::ConfigError;
use atp_polling::WaitTimedOut;
use thiserror::Error;

/// 命令/宏错误
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("资源准备失败: {0}")]
    PrepareFailed(String),

    #[error("命令执行失败: {0}")]
    ExecutionFailed(String),

    #[error("等待超时: {0}")]
    WaitTimedOut(String),

    #[error("不支持的操作: {0}")]
    NotSupported(String),

    #[error("状态无效: {0}")]
    InvalidState(String),

    #[error("执行过程中发生 panic: {0}")]
    Panicked(String),

    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("远端操作失败: {0:#}")]
    Remote(#[from] anyhow::Error),
}

impl<T: fmt::Debug> From<WaitTimedOut<T>> for CommandError {
    fn from(err: WaitTimedOut<T>) -> Self {
        CommandError::WaitTimedOut(format!("{} (最后结果: {:?})", err.message, err.last_result))
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
