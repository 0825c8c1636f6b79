//! SSH 错误定义

use thiserror::Error;

/// SSH 操作结果类型
pub type Result<T> = std::result::Result<T, SshError>;

/// SSH 错误类型
#[derive(Error, Debug)]
pub enum SshError {
    /// 连接错误
    #[error("SSH 连接失败: {0}")]
    ConnectionError(String),

    /// 认证错误
    #[error("SSH 认证失败: {0}")]
    AuthenticationError(String),

    /// 会话错误（未建立连接、运行时创建失败等）
    #[error("SSH 会话错误: {0}")]
    SessionError(String),

    /// 命令执行错误
    #[error("命令执行失败: {0}")]
    ExecutionError(String),

    /// 超时错误
    #[error("SSH 操作超时: {0}")]
    TimeoutError(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 输出匹配表达式无效
    #[error("无效的匹配表达式: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl From<SshError> for atp_orchestrator::CommandError {
    fn from(err: SshError) -> Self {
        atp_orchestrator::CommandError::Remote(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_orchestrator::CommandError;

    #[test]
    fn test_converts_to_remote_command_error() {
        let err: CommandError = SshError::TimeoutError("uptime".to_string()).into();
        assert!(matches!(err, CommandError::Remote(_)));
        assert_eq!(err.to_string(), "远端操作失败: SSH 操作超时: uptime");
    }
}
