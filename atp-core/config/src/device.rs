//! 设备清单与凭据解析

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 默认管理员用户名
pub const ADMIN_USERNAME: &str = "admin";
/// 默认管理员密码
pub const ADMIN_PASSWORD: &str = "admin";
/// 默认 root 用户名
pub const ROOT_USERNAME: &str = "root";
/// 默认 root 密码
pub const ROOT_PASSWORD: &str = "default";

/// 凭据组选择
///
/// - `Default`: 出厂默认凭据
/// - `Common`: 配置文件中指定的凭据（未指定时回退到默认）
/// - `Lock`: 锁定后使用的凭据（未指定时回退到 Common）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyset {
    Default,
    #[default]
    Common,
    Lock,
}

/// 用户名 + 密码
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// 日志中不输出密码
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:***", self.username)
    }
}

/// 配置文件中的凭据覆盖项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_password: Option<String>,
}

/// 三组凭据的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialChain {
    pub default: Credential,
    pub common: Credential,
    pub lock: Credential,
}

impl CredentialChain {
    fn resolve(spec: &CredentialSpec, default: Credential) -> Self {
        let common = Credential::new(
            spec.username.clone().unwrap_or_else(|| default.username.clone()),
            spec.password.clone().unwrap_or_else(|| default.password.clone()),
        );
        let lock = Credential::new(
            spec.lock_username.clone().unwrap_or_else(|| common.username.clone()),
            spec.lock_password.clone().unwrap_or_else(|| common.password.clone()),
        );
        Self {
            default,
            common,
            lock,
        }
    }

    fn select(&self, keyset: Keyset) -> &Credential {
        match keyset {
            Keyset::Default => &self.default,
            Keyset::Common => &self.common,
            Keyset::Lock => &self.lock,
        }
    }
}

/// 设备配置项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// 管理地址
    pub address: String,

    /// 被其他设备发现时使用的地址（未指定时使用管理地址）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discover_address: Option<String>,

    /// SSH 端口
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// 管理员凭据
    #[serde(default)]
    pub admin: CredentialSpec,

    /// root 凭据
    #[serde(default)]
    pub root: CredentialSpec,

    /// 标签
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// 分组
    #[serde(default)]
    pub groups: BTreeSet<String>,

    /// 是否为默认设备
    #[serde(default)]
    pub default: bool,

    /// 默认使用的凭据组
    #[serde(default)]
    pub keyset: Keyset,
}

fn default_ssh_port() -> u16 {
    22
}

impl DeviceSpec {
    /// 仅指定地址的设备
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            discover_address: None,
            ssh_port: default_ssh_port(),
            admin: CredentialSpec::default(),
            root: CredentialSpec::default(),
            tags: BTreeSet::new(),
            groups: BTreeSet::new(),
            default: false,
            keyset: Keyset::default(),
        }
    }
}

/// 设备访问信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAccess {
    pub alias: String,
    pub address: String,
    pub ssh_port: u16,
    pub tags: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    discover_address: Option<String>,
    keyset: Keyset,
    is_default: bool,
    admin: CredentialChain,
    root: CredentialChain,
}

impl DeviceAccess {
    /// 从设备配置项解析
    pub fn from_spec(alias: &str, spec: &DeviceSpec) -> Self {
        Self {
            alias: alias.to_string(),
            address: spec.address.clone(),
            ssh_port: spec.ssh_port,
            tags: spec.tags.clone(),
            groups: spec.groups.clone(),
            discover_address: spec.discover_address.clone(),
            keyset: spec.keyset,
            is_default: spec.default,
            admin: CredentialChain::resolve(
                &spec.admin,
                Credential::new(ADMIN_USERNAME, ADMIN_PASSWORD),
            ),
            root: CredentialChain::resolve(
                &spec.root,
                Credential::new(ROOT_USERNAME, ROOT_PASSWORD),
            ),
        }
    }

    /// 被发现地址
    pub fn discover_address(&self) -> &str {
        self.discover_address.as_deref().unwrap_or(&self.address)
    }

    /// 是否为默认设备
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// 管理员凭据，`keyset` 为 `None` 时使用设备配置的凭据组
    pub fn admin_creds(&self, keyset: Option<Keyset>) -> &Credential {
        self.admin.select(keyset.unwrap_or(self.keyset))
    }

    /// root 凭据，`keyset` 为 `None` 时使用设备配置的凭据组
    pub fn root_creds(&self, keyset: Option<Keyset>) -> &Credential {
        self.root.select(keyset.unwrap_or(self.keyset))
    }

    /// 按用户名查找凭据
    pub fn creds_by_username(&self, username: &str) -> Option<&Credential> {
        [&self.admin, &self.root]
            .into_iter()
            .flat_map(|chain| [&chain.common, &chain.lock, &chain.default])
            .find(|cred| cred.username == username)
    }
}

impl fmt::Display for DeviceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.alias, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_fall_back_to_defaults() {
        let access = DeviceAccess::from_spec("bigip-1", &DeviceSpec::new("10.0.0.1"));

        assert_eq!(access.admin_creds(None), &Credential::new("admin", "admin"));
        assert_eq!(access.root_creds(None), &Credential::new("root", "default"));
        assert_eq!(
            access.root_creds(Some(Keyset::Lock)),
            &Credential::new("root", "default")
        );
    }

    #[test]
    fn test_lock_credentials_fall_back_to_common() {
        let mut spec = DeviceSpec::new("10.0.0.1");
        spec.admin.password = Some("s3cret".to_string());
        spec.root.lock_password = Some("locked".to_string());
        let access = DeviceAccess::from_spec("bigiq-1", &spec);

        assert_eq!(access.admin_creds(None).password, "s3cret");
        assert_eq!(access.admin_creds(Some(Keyset::Lock)).password, "s3cret");
        assert_eq!(access.admin_creds(Some(Keyset::Default)).password, "admin");
        assert_eq!(access.root_creds(Some(Keyset::Lock)).password, "locked");
        assert_eq!(access.root_creds(Some(Keyset::Common)).password, "default");
    }

    #[test]
    fn test_device_keyset_selects_default_group() {
        let mut spec = DeviceSpec::new("10.0.0.1");
        spec.keyset = Keyset::Lock;
        spec.root.lock_password = Some("locked".to_string());
        let access = DeviceAccess::from_spec("d", &spec);

        assert_eq!(access.root_creds(None).password, "locked");
    }

    #[test]
    fn test_discover_address() {
        let mut spec = DeviceSpec::new("10.0.0.1");
        let access = DeviceAccess::from_spec("d", &spec);
        assert_eq!(access.discover_address(), "10.0.0.1");

        spec.discover_address = Some("192.168.10.1".to_string());
        let access = DeviceAccess::from_spec("d", &spec);
        assert_eq!(access.discover_address(), "192.168.10.1");
        assert_eq!(access.to_string(), "d:10.0.0.1");
    }

    #[test]
    fn test_creds_by_username() {
        let mut spec = DeviceSpec::new("10.0.0.1");
        spec.admin.username = Some("ops".to_string());
        let access = DeviceAccess::from_spec("d", &spec);

        assert!(access.creds_by_username("ops").is_some());
        assert!(access.creds_by_username("root").is_some());
        assert!(access.creds_by_username("nobody").is_none());
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let cred = Credential::new("root", "topsecret");
        assert_eq!(format!("{:?}", cred), "root:***");
    }
}
