//! CLI 通用输出格式化模块

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::Path;

use atp_orchestrator::{MacroReport, ParallelReport, StepStatus};

/// 可输出为表格行的数据 trait
pub trait TableRow {
    /// 返回表格列标题
    fn headers() -> Vec<&'static str>;

    /// 返回该项的表格行数据
    fn row(&self) -> Vec<String>;
}

/// 表格格式输出
pub fn print_table<T: TableRow>(items: &[T]) {
    let header_line = format_row(T::headers().iter());
    println!("{}", header_line.bold());
    println!("{}", "-".repeat(header_line.chars().count()));

    for item in items {
        println!("{}", format_row(item.row().iter()));
    }
}

fn format_row<S: AsRef<str>>(cells: impl Iterator<Item = S>) -> String {
    cells
        .map(|c| format!("{:<20}", c.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end()
        .to_string()
}

/// 按文件扩展名序列化为 JSON 或 YAML 并写入文件
pub fn write_serialized<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(value)?,
        Some("json") | None => serde_json::to_string_pretty(value)?,
        Some(other) => anyhow::bail!("不支持的报告格式: {}，仅支持 json/yaml", other),
    };

    fs::write(path, content).with_context(|| format!("写入报告失败: {:?}", path))?;
    Ok(())
}

/// 打印单个宏的结果
pub fn print_macro_report(report: &MacroReport) {
    let status = if report.is_success() {
        "✓ 成功".green().bold()
    } else {
        "✗ 失败".red().bold()
    };
    println!(
        "\n{} {} ({:.2}s)",
        status,
        report.name.cyan(),
        report.duration.as_secs_f64()
    );

    for step in &report.steps {
        let marker = match step.status {
            StepStatus::Completed => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Reverted => "↺".yellow(),
            StepStatus::RevertFailed => "!".red(),
            StepStatus::NotRun => "-".bright_black(),
        };
        println!("  {} {}. {}", marker, step.step_index + 1, step.name);
        if let Some(error) = &step.error {
            println!("      {}", error.red());
        }
    }

    for failure in &report.secondary_failures {
        println!(
            "  {} {:?} {}: {}",
            "⚠".yellow(),
            failure.phase,
            failure.command,
            failure.error.bright_black()
        );
    }
}

/// 打印并行执行汇总
pub fn print_summary(report: &ParallelReport) {
    for macro_report in &report.reports {
        print_macro_report(macro_report);
    }

    println!();
    println!("{}", "=".repeat(60));
    println!(
        "宏总数: {}  成功: {}  失败: {}",
        report.reports.len() + report.failures.iter().filter(|f| f.panicked).count(),
        report
            .reports
            .iter()
            .filter(|r| r.is_success())
            .count()
            .to_string()
            .green(),
        report.failures.len().to_string().red()
    );

    for failure in &report.failures {
        let tag = if failure.panicked { " (panic)" } else { "" };
        println!(
            "  {} [{}] {}{}: {}",
            "✗".red(),
            failure.thread_name.bright_black(),
            failure.macro_name,
            tag,
            failure.error
        );
    }
}
