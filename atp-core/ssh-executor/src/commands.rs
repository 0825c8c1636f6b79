//! 可编排的 SSH 命令
//!
//! 这些类型实现 [`atp_orchestrator::Command`]：`prepare` 建立 SSH 会话，
//! `release` 关闭会话，可以直接加入 [`atp_orchestrator::Macro`]。

use std::fmt;
use std::time::Duration;

use atp_config::DeviceAccess;
use atp_orchestrator::{Command, CommandError, Result};
use atp_polling::{Poller, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
use regex::Regex;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::client::{CommandOutput, SshClient};
use crate::config::SshConfig;
use crate::error::SshError;

/// 同步 SSH 会话
///
/// 持有一个单线程 tokio 运行时和已连接的客户端，供同步的命令生命周期使用。
pub struct SshSession {
    runtime: Runtime,
    client: SshClient,
}

impl SshSession {
    /// 建立连接
    pub fn open(config: SshConfig) -> crate::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SshError::SessionError(format!("创建运行时失败: {}", e)))?;
        let client = runtime.block_on(SshClient::connect(config))?;
        Ok(Self { runtime, client })
    }

    /// 执行命令
    pub fn execute(&self, command: &str) -> crate::Result<CommandOutput> {
        self.runtime.block_on(self.client.execute(command))
    }

    /// 执行命令并检查退出码
    pub fn execute_checked(&self, command: &str) -> crate::Result<CommandOutput> {
        self.runtime.block_on(self.client.execute_checked(command))
    }

    /// 连接配置
    pub fn config(&self) -> &SshConfig {
        self.client.config()
    }
}

impl fmt::Debug for SshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSession")
            .field("address", &self.client.config().address())
            .finish()
    }
}

fn open_session(config: &SshConfig) -> Result<SshSession> {
    SshSession::open(config.clone()).map_err(|e| CommandError::PrepareFailed(e.to_string()))
}

fn session_of(session: &Option<SshSession>) -> Result<&SshSession> {
    session
        .as_ref()
        .ok_or_else(|| CommandError::InvalidState("SSH 会话尚未建立".to_string()))
}

/// 执行一条 shell 命令，退出码非 0 视为失败
///
/// 可选的补偿命令在回滚时执行；补偿命令退出码非 0 只记录警告，
/// 因为远端可能已经不是执行后的状态。
#[derive(Debug)]
pub struct Generic {
    config: SshConfig,
    command: String,
    undo: Option<String>,
    session: Option<SshSession>,
}

impl Generic {
    pub fn new(config: SshConfig, command: impl Into<String>) -> Self {
        Self {
            config,
            command: command.into(),
            undo: None,
            session: None,
        }
    }

    /// 以设备 root 凭据执行
    pub fn on_device(device: &DeviceAccess, command: impl Into<String>) -> Self {
        Self::new(SshConfig::for_device(device), command)
    }

    /// 设置补偿命令
    pub fn with_undo(mut self, undo: impl Into<String>) -> Self {
        self.undo = Some(undo.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Command for Generic {
    type Output = CommandOutput;

    fn name(&self) -> String {
        format!("ssh[{}]: {}", self.config.host, self.command)
    }

    fn prepare(&mut self) -> Result<()> {
        self.session = Some(open_session(&self.config)?);
        Ok(())
    }

    fn execute(&mut self) -> Result<CommandOutput> {
        let output = session_of(&self.session)?.execute_checked(&self.command)?;
        debug!("[{}] {} => {}", self.config.host, self.command, output.stdout);
        Ok(output)
    }

    fn undo(&mut self) -> Result<()> {
        let Some(undo) = &self.undo else {
            return Ok(());
        };

        info!("[{}] 执行补偿命令: {}", self.config.host, undo);
        let output = session_of(&self.session)?.execute(undo)?;
        if !output.is_success() {
            warn!(
                "[{}] 补偿命令退出码 {:?}，忽略: {}",
                self.config.host,
                output.exit_code,
                output.combined_output()
            );
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.session.take().is_some() {
            debug!("关闭 SSH 会话: {}", self.config.address());
        }
        Ok(())
    }
}

/// 反复执行命令，直到标准输出匹配给定的正则表达式
#[derive(Debug)]
pub struct WaitForOutput {
    config: SshConfig,
    command: String,
    pattern: Regex,
    timeout: Option<Duration>,
    interval: Option<Duration>,
    session: Option<SshSession>,
}

impl WaitForOutput {
    pub fn new(config: SshConfig, command: impl Into<String>, pattern: &str) -> crate::Result<Self> {
        Ok(Self {
            config,
            command: command.into(),
            pattern: Regex::new(pattern)?,
            timeout: None,
            interval: None,
            session: None,
        })
    }

    /// 以设备 root 凭据执行
    pub fn on_device(
        device: &DeviceAccess,
        command: impl Into<String>,
        pattern: &str,
    ) -> crate::Result<Self> {
        Self::new(SshConfig::for_device(device), command, pattern)
    }

    /// 超时时间，未设置时使用当前配置的 `wait.timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 轮询间隔，未设置时使用当前配置的 `wait.interval_ms`
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// 实际使用的超时和间隔
    fn wait_params(&self) -> (Duration, Duration) {
        let configured = atp_config::with_current(|c| (c.wait.timeout(), c.wait.interval()))
            .unwrap_or((DEFAULT_TIMEOUT, DEFAULT_INTERVAL));
        (
            self.timeout.unwrap_or(configured.0),
            self.interval.unwrap_or(configured.1),
        )
    }
}

impl Command for WaitForOutput {
    type Output = String;

    fn name(&self) -> String {
        format!("wait[{}]: {} =~ /{}/", self.config.host, self.command, self.pattern)
    }

    fn prepare(&mut self) -> Result<()> {
        self.session = Some(open_session(&self.config)?);
        Ok(())
    }

    fn execute(&mut self) -> Result<String> {
        let (timeout, interval) = self.wait_params();
        let session = session_of(&self.session)?;
        let pattern = &self.pattern;
        let host = &self.config.host;

        let output = Poller::new()
            .condition(|out: &CommandOutput| pattern.is_match(&out.stdout))
            .progress(|out: &CommandOutput| {
                format!("[{}] 等待输出匹配 /{}/，当前: {}", host, pattern, out.stdout)
            })
            .timeout(timeout)
            .interval(interval)
            .timeout_message(format!(
                "[{}] {} 的输出在 {:?} 内未匹配 /{}/",
                host, self.command, timeout, pattern
            ))
            .try_wait(|| session.execute(&self.command).map_err(CommandError::from))?;

        Ok(output.stdout)
    }

    fn release(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_config::{DeviceSpec, TestConfig};

    fn device() -> DeviceAccess {
        DeviceAccess::from_spec("bigip-1", &DeviceSpec::new("10.0.0.1"))
    }

    #[test]
    fn test_generic_name() {
        let cmd = Generic::on_device(&device(), "bigstart restart").with_undo("bigstart stop");
        assert_eq!(Command::name(&cmd), "ssh[10.0.0.1]: bigstart restart");
        assert_eq!(cmd.command(), "bigstart restart");
    }

    #[test]
    fn test_execute_without_session_is_invalid_state() {
        let mut cmd = Generic::on_device(&device(), "uptime");
        let err = cmd.execute().unwrap_err();
        assert!(matches!(err, CommandError::InvalidState(_)));
    }

    #[test]
    fn test_undo_without_undo_command_is_noop() {
        let mut cmd = Generic::on_device(&device(), "uptime");
        assert!(cmd.undo().is_ok());
        assert!(cmd.release().is_ok());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = WaitForOutput::on_device(&device(), "cat /var/prompt", "(").unwrap_err();
        assert!(matches!(err, SshError::InvalidPattern(_)));
    }

    #[test]
    fn test_wait_params_follow_installed_config() {
        let cmd = WaitForOutput::on_device(&device(), "cat /var/prompt", "Active").unwrap();
        assert_eq!(cmd.wait_params(), (DEFAULT_TIMEOUT, DEFAULT_INTERVAL));

        let mut config = TestConfig::default();
        config.wait.timeout = 30;
        config.wait.interval_ms = 250;
        let _guard = atp_config::install(config);

        assert_eq!(
            cmd.wait_params(),
            (Duration::from_secs(30), Duration::from_millis(250))
        );

        let cmd = cmd.timeout(Duration::from_secs(5));
        assert_eq!(cmd.wait_params().0, Duration::from_secs(5));
    }
}
