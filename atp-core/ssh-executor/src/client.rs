//! SSH 客户端实现
//!
//! 使用系统 ssh/sshpass 命令执行远程命令，兼容性更好

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::{AuthMethod, SshConfig};
use crate::error::{Result, SshError};

/// 命令执行输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 退出码
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// 检查命令是否成功执行
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 获取合并的输出（stdout + stderr）
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// 失败时用于错误信息的输出（优先 stderr）
    fn failure_detail(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// SSH 客户端（使用系统 ssh 命令）
pub struct SshClient {
    config: SshConfig,
}

impl SshClient {
    /// 连接到 SSH 服务器（验证连接）
    pub async fn connect(config: SshConfig) -> Result<Self> {
        info!("正在连接 SSH: {}@{}", config.username, config.address());

        let client = Self { config };

        let output = client.execute("echo connected").await?;
        if output.stdout.trim() != "connected" {
            return Err(SshError::ConnectionError(format!(
                "{} 连接验证失败: {}",
                client.config.address(),
                output.failure_detail()
            )));
        }

        info!("SSH 连接成功: {}@{}", client.config.username, client.config.address());
        Ok(client)
    }

    /// 执行命令
    pub async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("[{}] 执行命令: {}", self.config.host, command);

        timeout(self.config.command_timeout, self.execute_internal(command))
            .await
            .map_err(|_| SshError::TimeoutError(format!("命令执行超时: {}", command)))?
    }

    async fn execute_internal(&self, command: &str) -> Result<CommandOutput> {
        let (program, args) = ssh_invocation(&self.config, command);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SshError::ExecutionError(format!("启动 SSH 进程失败: {}", e)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SshError::ExecutionError(format!("等待 SSH 进程失败: {}", e)))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        };

        if is_auth_failure(&result) {
            return Err(SshError::AuthenticationError(format!(
                "{}@{}: {}",
                self.config.username, self.config.host, result.stderr
            )));
        }

        debug!(
            "命令执行完成, 退出码: {:?}, stdout 长度: {}, stderr 长度: {}",
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }

    /// 执行命令并检查是否成功
    pub async fn execute_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.execute(command).await?;

        if !output.is_success() {
            return Err(SshError::ExecutionError(format!(
                "{} (退出码 {:?}): {}",
                command,
                output.exit_code,
                output.failure_detail()
            )));
        }

        Ok(output)
    }

    /// 获取配置
    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

/// 构造 ssh 进程的程序名和参数
fn ssh_invocation(config: &SshConfig, command: &str) -> (&'static str, Vec<OsString>) {
    let mut args: Vec<OsString> = Vec::new();

    let program = match &config.auth {
        AuthMethod::Password(password) => {
            args.extend(["-p".into(), password.into(), "ssh".into()]);
            "sshpass"
        }
        AuthMethod::Key { key_path } => {
            args.extend(["-i".into(), expand_path(key_path).into_os_string()]);
            "ssh"
        }
        AuthMethod::DefaultKey => "ssh",
    };

    for option in [
        "StrictHostKeyChecking=no".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout.as_secs()),
        "NumberOfPasswordPrompts=1".to_string(),
    ] {
        args.push("-o".into());
        args.push(option.into());
    }

    args.push("-p".into());
    args.push(config.port.to_string().into());
    args.push(format!("{}@{}", config.username, config.host).into());
    args.push(command.into());

    (program, args)
}

/// ssh 以 255（sshpass 以 5）退出且 stderr 提示认证问题
fn is_auth_failure(output: &CommandOutput) -> bool {
    matches!(output.exit_code, Some(5) | Some(255))
        && ["Permission denied", "Authentication failed", "password"]
            .iter()
            .any(|pattern| output.stderr.contains(pattern))
}

/// 展开路径（处理 ~）
fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(config: &SshConfig) -> (&'static str, Vec<String>) {
        let (program, args) = ssh_invocation(config, "uptime");
        let args = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        (program, args)
    }

    #[test]
    fn test_command_output() {
        let output = CommandOutput {
            stdout: "hello".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(output.is_success());
        assert_eq!(output.combined_output(), "hello");
    }

    #[test]
    fn test_password_invocation_uses_sshpass() {
        let config = SshConfig::with_password("10.0.0.1", "root", "default").port(2022);
        let (program, args) = args_of(&config);

        assert_eq!(program, "sshpass");
        assert_eq!(&args[..3], ["-p", "default", "ssh"]);
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert_eq!(&args[args.len() - 3..], ["2022", "root@10.0.0.1", "uptime"]);
    }

    #[test]
    fn test_key_invocation() {
        let config = SshConfig::with_key("host", "admin", "/keys/id_ed25519");
        let (program, args) = args_of(&config);

        assert_eq!(program, "ssh");
        assert_eq!(&args[..2], ["-i", "/keys/id_ed25519"]);
    }

    #[test]
    fn test_auth_failure_detection() {
        let denied = CommandOutput {
            stdout: String::new(),
            stderr: "Permission denied (publickey,password).".to_string(),
            exit_code: Some(255),
        };
        assert!(is_auth_failure(&denied));

        let remote_failure = CommandOutput {
            stderr: "Permission denied".to_string(),
            exit_code: Some(1),
            ..CommandOutput::default()
        };
        assert!(!is_auth_failure(&remote_failure));
    }

    #[test]
    fn test_expand_path() {
        let path = PathBuf::from("/etc/hosts");
        assert_eq!(expand_path(&path), path);
    }
}
