//! 宏执行计划
//!
//! 计划文件描述一组按顺序执行的 SSH 步骤，以及要在哪些设备上执行：
//!
//! ```yaml
//! name: restart-services
//! devices: [bigip-1, bigip-2]   # 省略时使用默认设备, "^all" 代表全部设备
//! steps:
//!   - command:
//!       run: bigstart stop restjavad
//!       undo: bigstart start restjavad
//!   - wait:
//!       command: cat /var/prompt/ps1
//!       expect: Active
//!       timeout: 300
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use atp_config::{DeviceAccess, TestConfig};
use atp_orchestrator::Macro;
use atp_ssh_executor::{Generic, WaitForOutput};

/// 宏执行计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroPlan {
    /// 计划名称
    pub name: String,

    /// 描述
    #[serde(default)]
    pub description: Option<String>,

    /// 目标设备别名
    #[serde(default)]
    pub devices: Vec<String>,

    /// 步骤
    pub steps: Vec<PlanStep>,
}

/// 计划步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    /// 执行命令（可带补偿命令）
    Command {
        run: String,
        #[serde(default)]
        undo: Option<String>,
    },

    /// 等待命令输出匹配
    Wait {
        command: String,
        expect: String,
        /// 超时 (秒)
        #[serde(default)]
        timeout: Option<u64>,
        /// 轮询间隔 (毫秒)
        #[serde(default, alias = "interval_ms")]
        interval: Option<u64>,
    },
}

impl MacroPlan {
    /// 从 YAML / JSON 文件加载
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取计划文件失败: {:?}", path))?;

        let plan: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 计划失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 计划失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的计划文件格式，仅支持 .yaml/.yml 或 .json"),
        };

        plan.validate()?;
        Ok(plan)
    }

    /// 校验计划
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("计划名称不能为空");
        }
        if self.steps.is_empty() {
            anyhow::bail!("计划 {} 没有任何步骤", self.name);
        }
        Ok(())
    }

    /// 解析目标设备
    pub fn resolve_devices(&self, config: &TestConfig) -> Result<Vec<DeviceAccess>> {
        let devices = if self.devices.is_empty() {
            vec![config.get_device(None)?]
        } else {
            config.expand_devices(&self.devices)?
        };

        if devices.is_empty() {
            anyhow::bail!("计划 {} 没有匹配到任何设备", self.name);
        }
        Ok(devices)
    }

    /// 为每台设备构造一个宏
    pub fn build_macros(&self, config: &TestConfig) -> Result<Vec<Macro>> {
        self.resolve_devices(config)?
            .iter()
            .map(|device| self.build_macro(device))
            .collect()
    }

    fn build_macro(&self, device: &DeviceAccess) -> Result<Macro> {
        let mut m = Macro::new(format!("{}@{}", self.name, device.alias));

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                PlanStep::Command { run, undo } => {
                    let mut cmd = Generic::on_device(device, run);
                    if let Some(undo) = undo {
                        cmd = cmd.with_undo(undo);
                    }
                    m.add_command(cmd);
                }
                PlanStep::Wait {
                    command,
                    expect,
                    timeout,
                    interval,
                } => {
                    let mut cmd = WaitForOutput::on_device(device, command, expect)
                        .with_context(|| format!("步骤 {} 无效", index + 1))?;
                    if let Some(secs) = timeout {
                        cmd = cmd.timeout(Duration::from_secs(*secs));
                    }
                    if let Some(ms) = interval {
                        cmd = cmd.interval(Duration::from_millis(*ms));
                    }
                    m.add_command(cmd);
                }
            }
        }

        Ok(m)
    }
}
