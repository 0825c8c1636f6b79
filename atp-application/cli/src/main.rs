//! ATP CLI 应用

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

mod commands;
mod plan;

#[derive(Parser)]
#[command(name = "atp")]
#[command(about = "ATP - 设备自动化测试编排工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// 测试配置文件 (未指定时按默认搜索路径查找)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 在设备上并行执行宏计划
    Run {
        /// 计划文件路径 (.yaml/.yml/.json)
        plan: PathBuf,

        /// 报告输出文件 (.json/.yaml)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// 等待设备上命令的输出匹配
    Wait {
        /// 设备别名 (默认使用默认设备)
        #[arg(long, short = 'd')]
        device: Option<String>,

        /// 要执行的命令
        #[arg(long)]
        command: String,

        /// 期望匹配的正则表达式
        #[arg(long)]
        expect: String,

        /// 超时 (秒)
        #[arg(long)]
        timeout: Option<u64>,

        /// 轮询间隔 (毫秒)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 显示生效的配置
    Show {
        /// 输出格式 (yaml/json/toml)
        #[arg(long, default_value = "yaml")]
        format: String,
    },
    /// 校验配置
    Validate,
    /// 列出设备
    Devices,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("ATP CLI 启动");

    match dispatch(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("错误: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// 处理命令，返回是否全部成功
fn dispatch(cli: Cli) -> Result<bool> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run { plan, report } => commands::run::handle(config, &plan, report.as_deref()),
        Commands::Config { action } => commands::config::handle(config, action),
        Commands::Wait {
            device,
            command,
            expect,
            timeout,
            interval,
        } => commands::wait::handle(
            config,
            commands::wait::WaitArgs {
                device,
                command,
                expect,
                timeout,
                interval,
            },
        ),
    }
}
