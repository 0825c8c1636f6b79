//! ATP SSH 执行器
//!
//! 提供 SSH 远程命令执行能力：
//! - [`SshClient`]: 通过系统 ssh/sshpass 执行命令的异步客户端
//! - [`commands`]: 实现命令生命周期的 SSH 命令，可直接加入宏
//!
//! # 示例
//!
//! ```ignore
//! use atp_orchestrator::Macro;
//! use atp_ssh_executor::commands::{Generic, WaitForOutput};
//!
//! let device = config.get_device(Some("bigip-1"))?;
//!
//! let mut m = Macro::new("restart");
//! m.add_command(Generic::on_device(&device, "bigstart restart"))
//!     .add_command(WaitForOutput::on_device(&device, "cat /var/prompt/ps1", "Active")?);
//! m.run()?;
//! ```

mod client;
pub mod commands;
mod config;
mod error;

pub use client::{CommandOutput, SshClient};
pub use commands::{Generic, SshSession, WaitForOutput};
pub use config::{AuthMethod, SshConfig};
pub use error::{Result, SshError};
