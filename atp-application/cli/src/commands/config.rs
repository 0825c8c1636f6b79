//! 配置管理命令

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use atp_config::{DeviceAccess, TestConfig};

use super::output::{self, TableRow};

pub fn handle(config_path: Option<&Path>, action: crate::ConfigAction) -> Result<bool> {
    let config = TestConfig::load_from(config_path)?;

    match action {
        crate::ConfigAction::Show { format } => show(&config, &format)?,
        crate::ConfigAction::Validate => return Ok(validate(&config)),
        crate::ConfigAction::Devices => devices(&config),
    }

    Ok(true)
}

fn show(config: &TestConfig, format: &str) -> Result<()> {
    let rendered = match format {
        "json" => serde_json::to_string_pretty(config)?,
        "toml" => toml::to_string_pretty(config)?,
        "yaml" => serde_yaml::to_string(config)?,
        other => anyhow::bail!("不支持的输出格式: {}，仅支持 yaml/json/toml", other),
    };
    println!("{}", rendered);
    Ok(())
}

fn validate(config: &TestConfig) -> bool {
    match config.validate() {
        Ok(()) => {
            println!(
                "{} 配置有效 ({} 台设备)",
                "✓".green().bold(),
                config.devices.len()
            );
            true
        }
        Err(e) => {
            println!("{} 配置无效: {}", "✗".red().bold(), e);
            false
        }
    }
}

struct DeviceRow(DeviceAccess);

impl TableRow for DeviceRow {
    fn headers() -> Vec<&'static str> {
        vec!["别名", "地址", "SSH 端口", "默认", "标签"]
    }

    fn row(&self) -> Vec<String> {
        let device = &self.0;
        vec![
            device.alias.clone(),
            device.address.clone(),
            device.ssh_port.to_string(),
            if device.is_default() { "*" } else { "" }.to_string(),
            device.tags.iter().cloned().collect::<Vec<_>>().join(","),
        ]
    }
}

fn devices(config: &TestConfig) {
    let rows: Vec<DeviceRow> = config.all_devices().into_iter().map(DeviceRow).collect();

    if rows.is_empty() {
        println!("{} 配置中没有设备", "ℹ".yellow());
        return;
    }

    println!("{} 共 {} 台设备:\n", "✓".green(), rows.len());
    output::print_table(&rows);
}
