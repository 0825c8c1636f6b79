//! 宏执行报告

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 宏执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroReport {
    /// 宏名称
    pub name: String,

    /// 开始时间
    pub start_time: DateTime<Utc>,

    /// 结束时间
    pub end_time: Option<DateTime<Utc>>,

    /// 总耗时
    #[serde(skip)]
    pub duration: Duration,

    /// 总命令数
    pub total_steps: usize,

    /// 完成的命令数（未被撤销）
    pub completed_count: usize,

    /// 失败的命令数
    pub failed_count: usize,

    /// 已撤销的命令数
    pub reverted_count: usize,

    /// 命令结果列表（按添加顺序）
    pub steps: Vec<StepResult>,

    /// 回滚/清理期间的次要失败
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_failures: Vec<SecondaryFailure>,

    /// 导致宏失败的原始错误
    pub error: Option<String>,
}

impl MacroReport {
    /// 创建新的报告
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration: Duration::from_secs(0),
            total_steps: 0,
            completed_count: 0,
            failed_count: 0,
            reverted_count: 0,
            steps: Vec::new(),
            secondary_failures: Vec::new(),
            error: None,
        }
    }

    /// 添加命令结果
    pub fn add_step_result(&mut self, result: StepResult) {
        match result.status {
            StepStatus::Completed => self.completed_count += 1,
            StepStatus::Failed => self.failed_count += 1,
            StepStatus::Reverted | StepStatus::RevertFailed => self.reverted_count += 1,
            StepStatus::NotRun => {}
        }
        self.total_steps += 1;
        self.steps.push(result);
    }

    /// 完成报告
    pub fn finalize(&mut self) {
        let end_time = Utc::now();
        self.duration = (end_time - self.start_time)
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        self.end_time = Some(end_time);
    }

    /// 宏是否成功
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed_count == 0
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// 单个命令的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// 命令索引（添加顺序）
    pub step_index: usize,

    /// 命令名称
    pub name: String,

    /// 命令状态
    pub status: StepStatus,

    /// 错误信息
    pub error: Option<String>,

    /// 准备 + 执行耗时
    #[serde(skip)]
    pub duration: Duration,

    /// 输出摘要
    pub output: Option<String>,
}

/// 命令结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// 执行成功且未被撤销
    Completed,

    /// 准备或执行失败
    Failed,

    /// 执行成功后已被撤销
    Reverted,

    /// 执行成功，撤销失败
    RevertFailed,

    /// 未执行
    NotRun,
}

/// 次要失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePhase {
    /// 撤销
    Undo,
    /// 释放资源
    Release,
    /// 宏级别清理
    Teardown,
}

/// 回滚/清理期间的失败
///
/// 只用于诊断，不会替代导致宏失败的原始错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryFailure {
    /// 命令名称（宏级别清理时为宏名称）
    pub command: String,

    /// 阶段
    pub phase: FailurePhase,

    /// 错误信息
    pub error: String,
}
