//! 临时等待命令

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

use atp_config::TestConfig;
use atp_orchestrator::run_command;
use atp_ssh_executor::WaitForOutput;

/// `atp wait` 的参数
pub struct WaitArgs {
    pub device: Option<String>,
    pub command: String,
    pub expect: String,
    /// 秒
    pub timeout: Option<u64>,
    /// 毫秒
    pub interval: Option<u64>,
}

pub fn handle(config_path: Option<&Path>, args: WaitArgs) -> Result<bool> {
    let config = TestConfig::load_from(config_path)?;
    let device = config.get_device(args.device.as_deref())?;

    let mut cmd = WaitForOutput::on_device(&device, &args.command, &args.expect)?;
    if let Some(secs) = args.timeout {
        cmd = cmd.timeout(Duration::from_secs(secs));
    }
    if let Some(ms) = args.interval {
        cmd = cmd.interval(Duration::from_millis(ms));
    }

    println!(
        "等待 {} 上 `{}` 的输出匹配 /{}/ ...",
        device.to_string().cyan(),
        args.command,
        args.expect
    );

    // 未显式指定的超时和间隔取自配置
    let _guard = atp_config::install(config);
    let output = run_command(&mut cmd).context("等待失败")?;

    println!("{} 条件已满足", "✓".green().bold());
    println!("{}", output);
    Ok(true)
}
