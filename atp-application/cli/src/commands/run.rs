//! 宏计划执行命令

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tracing::{error, info};

use atp_config::TestConfig;
use atp_orchestrator::ParallelRunner;

use super::output;
use crate::plan::MacroPlan;

pub fn handle(config_path: Option<&Path>, plan_path: &Path, report_path: Option<&Path>) -> Result<bool> {
    let config = TestConfig::load_from(config_path)?;
    config.validate().context("测试配置无效")?;

    let plan = MacroPlan::from_file(plan_path)?;
    println!("{} 计划加载成功: {}", "✓".green().bold(), plan.name.cyan());
    if let Some(desc) = &plan.description {
        println!("描述: {}", desc.bright_black());
    }
    println!("步骤数: {}", plan.steps.len().to_string().yellow());

    let macros = plan.build_macros(&config)?;
    println!("目标设备数: {}", macros.len().to_string().yellow());

    let mut runner = ParallelRunner::new();
    for m in macros {
        runner.add(m);
    }

    info!("开始执行计划: {}", plan.name);
    let report = runner.run(&config);

    output::print_summary(&report);

    if let Some(path) = report_path {
        output::write_serialized(path, &report.reports)?;
        println!("\n报告已写入: {}", path.display().to_string().cyan());
    }

    let success = report.is_success();
    if success {
        println!("\n{} 计划执行成功", "✓".green().bold());
    } else {
        for failure in &report.failures {
            error!("{}", failure);
        }
        println!("\n{} 计划执行失败", "✗".red().bold());
    }

    Ok(success)
}
