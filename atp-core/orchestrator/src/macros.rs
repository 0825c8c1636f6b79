//! 宏：有序命令组合与补偿回滚
//!
//! `run()` 的执行过程：
//! 1. 宏级别 `prep` 钩子
//! 2. 按添加顺序对每个命令调用 `prepare` + `execute`，成功后记入 `completed_commands`
//! 3. 任一步失败：按完成顺序的逆序对已完成命令调用 `undo`，然后返回原始错误
//! 4. 无论成功与否：按添加顺序的逆序对所有已添加命令调用 `release`（每个恰好一次），
//!    最后执行宏级别 `teardown` 钩子
//!
//! 撤销/释放阶段的失败只记录日志和报告，既不会中断剩余的撤销/释放，
//! 也不会覆盖原始错误。

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::command::{guarded, take_last_panic, Command, CommandState, PanicTrace, Step};
use crate::report::{FailurePhase, MacroReport, SecondaryFailure, StepResult, StepStatus};
use crate::{CommandError, Result};

type Hook = Box<dyn FnOnce() -> Result<()> + Send>;

struct Entry {
    step: Box<dyn Step>,
    name: String,
    state: CommandState,
    status: StepStatus,
    error: Option<String>,
    output: Option<String>,
    duration: Duration,
}

/// 宏
pub struct Macro {
    name: String,
    entries: Vec<Entry>,
    completed: Vec<usize>,
    prep: Option<Hook>,
    teardown: Option<Hook>,
    secondary_failures: Vec<SecondaryFailure>,
    panic_trace: Option<PanicTrace>,
    started: bool,
    report: MacroReport,
}

impl Macro {
    /// 创建空宏
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let report = MacroReport::new(&name);
        Self {
            name,
            entries: Vec::new(),
            completed: Vec::new(),
            prep: None,
            teardown: None,
            secondary_failures: Vec::new(),
            panic_trace: None,
            started: false,
            report,
        }
    }

    /// 宏级别准备钩子，在第一个命令之前执行
    pub fn with_prep(mut self, hook: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        self.prep = Some(Box::new(hook));
        self
    }

    /// 宏级别清理钩子，在所有命令释放之后执行（无论成功与否）
    pub fn with_teardown(mut self, hook: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        self.teardown = Some(Box::new(hook));
        self
    }

    /// 追加命令
    pub fn add_command<C: Command + 'static>(&mut self, command: C) -> &mut Self {
        let name = Command::name(&command);
        debug!("宏 {} 添加命令 #{}: {}", self.name, self.entries.len(), name);
        self.entries.push(Entry {
            step: Box::new(command),
            name,
            state: CommandState::Created,
            status: StepStatus::NotRun,
            error: None,
            output: None,
            duration: Duration::ZERO,
        });
        self
    }

    /// 宏名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 命令数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有命令
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 所有命令名称（添加顺序）
    pub fn commands(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// 已完成 prepare + execute 的命令名称（完成顺序）
    pub fn completed_commands(&self) -> Vec<&str> {
        self.completed
            .iter()
            .map(|&i| self.entries[i].name.as_str())
            .collect()
    }

    /// 指定命令的生命周期状态
    pub fn command_state(&self, index: usize) -> Option<CommandState> {
        self.entries.get(index).map(|e| e.state)
    }

    /// 回滚/清理期间记录的失败
    pub fn secondary_failures(&self) -> &[SecondaryFailure] {
        &self.secondary_failures
    }

    /// 原始错误是 panic 时，panic 的位置与调用栈
    pub fn panic_trace(&self) -> Option<&PanicTrace> {
        self.panic_trace.as_ref()
    }

    /// 最近一次执行的报告
    pub fn report(&self) -> &MacroReport {
        &self.report
    }

    /// 执行宏
    ///
    /// 失败时返回导致失败的原始错误，此时回滚和资源释放均已完成。
    /// 每个宏只能执行一次。
    pub fn run(&mut self) -> Result<MacroReport> {
        if self.started {
            return Err(CommandError::InvalidState(format!(
                "宏 {} 已经执行过",
                self.name
            )));
        }
        self.started = true;
        self.report = MacroReport::new(&self.name);

        info!("开始执行宏: {} ({} 个命令)", self.name, self.entries.len());

        let outcome = self.prep_and_setup();

        if let Err(e) = &outcome {
            error!("宏 {} 执行失败: {}", self.name, e);
            if matches!(e, CommandError::Panicked(_)) {
                self.panic_trace = take_last_panic();
            }
            self.revert();
        }

        self.cleanup();
        self.build_report(outcome.as_ref().err());

        match outcome {
            Ok(()) => {
                info!("宏执行成功: {} (耗时 {:?})", self.name, self.report.duration);
                Ok(self.report.clone())
            }
            Err(e) => Err(e),
        }
    }

    fn prep_and_setup(&mut self) -> Result<()> {
        if let Some(prep) = self.prep.take() {
            debug!("执行宏 {} 的准备钩子", self.name);
            guarded(prep)?;
        }
        self.setup()
    }

    fn setup(&mut self) -> Result<()> {
        let total = self.entries.len();

        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.state != CommandState::Created {
                return Err(CommandError::InvalidState(format!(
                    "命令 {} 处于{}状态，无法执行",
                    entry.name, entry.state
                )));
            }
            info!("执行命令 {}/{}: {}", index + 1, total, entry.name);
            let start = Instant::now();

            if let Err(e) = guarded(|| entry.step.prepare()) {
                entry.duration = start.elapsed();
                entry.status = StepStatus::Failed;
                entry.error = Some(e.to_string());
                return Err(e);
            }
            entry.state = CommandState::Prepared;

            match guarded(|| entry.step.execute()) {
                Ok(output) => {
                    entry.duration = start.elapsed();
                    entry.state = CommandState::Executed;
                    entry.status = StepStatus::Completed;
                    debug!("命令 {} 完成: {}", entry.name, output);
                    entry.output = Some(output);
                    self.completed.push(index);
                }
                Err(e) => {
                    entry.duration = start.elapsed();
                    entry.status = StepStatus::Failed;
                    entry.error = Some(e.to_string());
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// 按完成顺序的逆序撤销已完成的命令
    ///
    /// 每个命令最多撤销一次；单个撤销失败不影响其余命令。
    /// 宏尚未执行时什么也不做。
    pub fn revert(&mut self) {
        if !self.started {
            debug!("宏 {} 尚未执行，跳过撤销", self.name);
            return;
        }
        if self.completed.is_empty() {
            debug!("宏 {} 没有需要撤销的命令", self.name);
            return;
        }

        info!("回滚宏 {}: 撤销 {} 个已完成命令", self.name, self.completed.len());

        for &index in self.completed.iter().rev() {
            let entry = &mut self.entries[index];
            if entry.state != CommandState::Executed {
                continue;
            }

            debug!("撤销命令: {}", entry.name);
            match guarded(|| entry.step.undo()) {
                Ok(()) => {
                    entry.state = CommandState::Reverted;
                    entry.status = StepStatus::Reverted;
                }
                Err(e) => {
                    warn!("撤销命令 {} 失败: {}", entry.name, e);
                    // 状态置为已撤销，保证补偿最多执行一次
                    entry.state = CommandState::Reverted;
                    entry.status = StepStatus::RevertFailed;
                    self.secondary_failures.push(SecondaryFailure {
                        command: entry.name.clone(),
                        phase: FailurePhase::Undo,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// 按添加顺序的逆序释放所有命令的资源，然后执行清理钩子
    ///
    /// 未准备过的命令也会被释放；每个命令恰好释放一次。
    /// 宏尚未执行时什么也不做，命令保持可执行状态。
    pub fn cleanup(&mut self) {
        if !self.started {
            debug!("宏 {} 尚未执行，跳过清理", self.name);
            return;
        }

        for entry in self.entries.iter_mut().rev() {
            if entry.state == CommandState::Released {
                continue;
            }

            debug!("释放命令资源: {}", entry.name);
            if let Err(e) = guarded(|| entry.step.release()) {
                warn!("释放命令 {} 资源失败: {}", entry.name, e);
                self.secondary_failures.push(SecondaryFailure {
                    command: entry.name.clone(),
                    phase: FailurePhase::Release,
                    error: e.to_string(),
                });
            }
            entry.state = CommandState::Released;
        }

        if let Some(teardown) = self.teardown.take() {
            debug!("执行宏 {} 的清理钩子", self.name);
            if let Err(e) = guarded(teardown) {
                warn!("宏 {} 清理钩子失败: {}", self.name, e);
                self.secondary_failures.push(SecondaryFailure {
                    command: self.name.clone(),
                    phase: FailurePhase::Teardown,
                    error: e.to_string(),
                });
            }
        }
    }

    fn build_report(&mut self, failure: Option<&CommandError>) {
        let mut report = MacroReport::new(&self.name);
        report.start_time = self.report.start_time;

        for (index, entry) in self.entries.iter().enumerate() {
            report.add_step_result(StepResult {
                step_index: index,
                name: entry.name.clone(),
                status: entry.status,
                error: entry.error.clone(),
                duration: entry.duration,
                output: entry.output.clone(),
            });
        }

        report.secondary_failures = self.secondary_failures.clone();
        report.error = failure.map(|e| e.to_string());
        report.finalize();
        self.report = report;
    }
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Macro")
            .field("name", &self.name)
            .field("commands", &self.commands())
            .field("completed_commands", &self.completed_commands())
            .finish()
    }
}
