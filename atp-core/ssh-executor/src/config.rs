//! SSH 配置

use atp_config::{DeviceAccess, Keyset};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// SSH 认证方式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthMethod {
    /// 密码认证
    Password(String),
    /// 密钥认证
    Key {
        /// 私钥路径
        key_path: PathBuf,
    },
    /// 使用默认密钥（~/.ssh/id_rsa, ~/.ssh/id_ed25519 等）
    DefaultKey,
}

/// SSH 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// 主机地址
    pub host: String,
    /// 端口（默认 22）
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 认证方式
    pub auth: AuthMethod,
    /// 连接超时
    #[serde(with = "duration_secs", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// 命令执行超时
    #[serde(with = "duration_secs", default = "default_command_timeout")]
    pub command_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

impl SshConfig {
    /// 使用密码认证创建配置
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, username, AuthMethod::Password(password.into()))
    }

    /// 使用密钥认证创建配置
    pub fn with_key(
        host: impl Into<String>,
        username: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(
            host,
            username,
            AuthMethod::Key {
                key_path: key_path.into(),
            },
        )
    }

    /// 使用默认密钥认证创建配置
    pub fn with_default_key(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(host, username, AuthMethod::DefaultKey)
    }

    /// 以设备的 root 凭据（设备配置的凭据组）创建配置
    pub fn for_device(device: &DeviceAccess) -> Self {
        Self::for_device_with_keyset(device, None)
    }

    /// 以设备指定凭据组的 root 凭据创建配置
    pub fn for_device_with_keyset(device: &DeviceAccess, keyset: Option<Keyset>) -> Self {
        let creds = device.root_creds(keyset);
        Self::with_password(&device.address, &creds.username, &creds.password)
            .port(device.ssh_port)
    }

    fn new(host: impl Into<String>, username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth,
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }

    /// 设置端口
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 设置连接超时
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 设置命令执行超时
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 获取 SSH 地址字符串（host:port 格式）
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 以秒为单位序列化 Duration
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_config::DeviceSpec;

    #[test]
    fn test_password_config() {
        let config = SshConfig::with_password("192.168.1.100", "root", "password123");
        assert_eq!(config.host, "192.168.1.100");
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "root");
        assert!(matches!(config.auth, AuthMethod::Password(_)));
    }

    #[test]
    fn test_config_builder() {
        let config = SshConfig::with_default_key("host", "user")
            .port(2222)
            .connect_timeout(Duration::from_secs(10));
        assert_eq!(config.port, 2222);
        assert_eq!(config.connect_timeout.as_secs(), 10);
        assert_eq!(config.address(), "host:2222");
    }

    #[test]
    fn test_for_device_uses_root_credentials() {
        let mut spec = DeviceSpec::new("10.1.1.5");
        spec.ssh_port = 2022;
        spec.root.password = Some("r00t".to_string());
        spec.root.lock_password = Some("locked".to_string());
        let device = DeviceAccess::from_spec("bigiq-1", &spec);

        let config = SshConfig::for_device(&device);
        assert_eq!(config.address(), "10.1.1.5:2022");
        assert_eq!(config.username, "root");
        assert!(matches!(config.auth, AuthMethod::Password(ref p) if p == "r00t"));

        let locked = SshConfig::for_device_with_keyset(&device, Some(Keyset::Lock));
        assert!(matches!(locked.auth, AuthMethod::Password(ref p) if p == "locked"));
    }
}
