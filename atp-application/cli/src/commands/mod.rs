//! CLI 命令处理模块

pub mod config;
pub mod output; // 报告输出
pub mod run;
pub mod wait;
