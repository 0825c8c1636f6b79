//! 宏并行执行
//!
//! 每个 [`MacroThread`] 在独立的系统线程上运行一个宏。线程启动时安装配置的
//! 私有深拷贝作为线程本地的当前配置，因此并发的宏之间不会看到彼此对配置的修改。
//! 宏失败（包括 panic）不会让线程静默退出，而是作为 [`ThreadFailure`]
//! 推送到共享的结果通道，由启动方在所有线程结束后统一汇总。

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender};
use atp_config::TestConfig;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::{install_panic_hook, panic_message, take_last_panic, PanicTrace};
use crate::report::MacroReport;
use crate::{CommandError, Macro};

/// 宏线程中捕获的失败
#[derive(Debug)]
pub struct ThreadFailure {
    /// 线程运行标识
    pub thread_id: Uuid,

    /// 线程名称
    pub thread_name: String,

    /// 宏名称
    pub macro_name: String,

    /// 导致失败的错误
    pub error: CommandError,

    /// 是否由 panic 逃逸出宏引起
    pub panicked: bool,

    /// 错误源自 panic 时，panic 的位置与调用栈
    pub panic: Option<PanicTrace>,
}

impl fmt::Display for ThreadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] 宏 {} 失败: {}", self.thread_name, self.macro_name, self.error)?;
        if let Some(location) = self.panic.as_ref().and_then(|p| p.location.as_ref()) {
            write!(f, " (位于 {})", location)?;
        }
        Ok(())
    }
}

/// 在独立线程上运行的宏
pub struct MacroThread {
    id: Uuid,
    name: String,
    inner: Macro,
    results: Sender<ThreadFailure>,
    config: TestConfig,
}

impl MacroThread {
    /// 创建宏线程
    ///
    /// `config` 在这里被深拷贝，之后对原配置的修改不会影响该线程。
    pub fn new(inner: Macro, results: Sender<ThreadFailure>, config: &TestConfig) -> Self {
        let id = Uuid::new_v4();
        let short_id: String = id.simple().to_string().chars().take(8).collect();
        let name = format!("macro-{}-{}", inner.name(), short_id);

        Self {
            id,
            name,
            inner,
            results,
            config: config.clone(),
        }
    }

    /// 线程运行标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 线程名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 启动线程
    ///
    /// 宏正常结束（成功或失败）时线程返回其报告；panic 逃逸时返回 `None`。
    pub fn start(self) -> io::Result<JoinHandle<Option<MacroReport>>> {
        let Self {
            id,
            name,
            mut inner,
            results,
            config,
        } = self;

        debug!("启动宏线程: {}", name);

        thread::Builder::new().name(name.clone()).spawn(move || {
            let _guard = atp_config::install(config);
            let macro_name = inner.name().to_string();
            install_panic_hook();

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| inner.run()));

            let (error, panicked, trace, report) = match outcome {
                Ok(Ok(report)) => {
                    info!("宏线程 {} 执行成功", name);
                    return Some(report);
                }
                Ok(Err(e)) => (
                    e,
                    false,
                    inner.panic_trace().cloned(),
                    Some(inner.report().clone()),
                ),
                Err(payload) => (
                    CommandError::Panicked(panic_message(payload.as_ref())),
                    true,
                    take_last_panic(),
                    None,
                ),
            };

            match &trace {
                Some(trace) => error!("宏线程 {} 执行失败: {}\n{}", name, error, trace),
                None => error!("宏线程 {} 执行失败: {}", name, error),
            }

            let failure = ThreadFailure {
                thread_id: id,
                thread_name: name,
                macro_name,
                error,
                panicked,
                panic: trace,
            };
            if let Err(e) = results.send_blocking(failure) {
                warn!("结果通道已关闭，丢弃失败记录: {}", e.into_inner());
            }

            report
        })
    }
}

/// 并行执行结果
#[derive(Debug, Default)]
pub struct ParallelReport {
    /// 各宏的执行报告（按添加顺序，panic 的宏没有报告）
    pub reports: Vec<MacroReport>,

    /// 捕获的失败
    pub failures: Vec<ThreadFailure>,
}

impl ParallelReport {
    /// 所有宏是否都成功
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// 转换为单一结果，多个失败合并为一个错误
    pub fn into_result(self) -> anyhow::Result<Vec<MacroReport>> {
        if self.failures.is_empty() {
            return Ok(self.reports);
        }

        let summary = self
            .failures
            .iter()
            .map(|f| format!("  - {}", f))
            .collect::<Vec<_>>()
            .join("\n");

        Err(anyhow::anyhow!(
            "{} 个宏执行失败:\n{}",
            self.failures.len(),
            summary
        ))
    }
}

/// 并行宏启动器
pub struct ParallelRunner {
    macros: Vec<Macro>,
    max_threads: Option<usize>,
}

impl ParallelRunner {
    pub fn new() -> Self {
        Self {
            macros: Vec::new(),
            max_threads: None,
        }
    }

    /// 添加宏
    pub fn add(&mut self, inner: Macro) -> &mut Self {
        self.macros.push(inner);
        self
    }

    /// 同时运行的线程上限，未设置时使用配置中的 `parallel.max_threads`
    pub fn max_threads(&mut self, max_threads: usize) -> &mut Self {
        self.max_threads = Some(max_threads.max(1));
        self
    }

    /// 待执行的宏数量
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// 启动所有宏，等待全部结束后汇总结果
    pub fn run(self, config: &TestConfig) -> ParallelReport {
        let limit = self
            .max_threads
            .unwrap_or(config.parallel.max_threads)
            .max(1);
        let total = self.macros.len();
        info!("并行执行 {} 个宏 (并发上限 {})", total, limit);

        let (tx, rx) = async_channel::unbounded();
        let mut report = ParallelReport::default();
        let mut pending = self.macros.into_iter();

        loop {
            let batch: Vec<Macro> = pending.by_ref().take(limit).collect();
            if batch.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for inner in batch {
                let macro_name = inner.name().to_string();
                let worker = MacroThread::new(inner, tx.clone(), config);
                let thread_id = worker.id();
                let thread_name = worker.name().to_string();

                match worker.start() {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!("无法启动宏线程 {}: {}", thread_name, e);
                        report.failures.push(ThreadFailure {
                            thread_id,
                            thread_name,
                            macro_name,
                            error: CommandError::Remote(anyhow::anyhow!("线程启动失败: {}", e)),
                            panicked: false,
                            panic: None,
                        });
                    }
                }
            }

            for handle in handles {
                match handle.join() {
                    Ok(Some(macro_report)) => report.reports.push(macro_report),
                    Ok(None) => {}
                    // 线程体已捕获 panic，这里只会在捕获之外的代码 panic 时发生
                    Err(payload) => error!("宏线程异常退出: {}", panic_message(payload.as_ref())),
                }
            }
        }

        drop(tx);
        report.failures.extend(drain(&rx));

        info!(
            "并行执行完成: {} 个宏, {} 个失败",
            total,
            report.failures.len()
        );
        report
    }
}

impl Default for ParallelRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn drain(rx: &Receiver<ThreadFailure>) -> Vec<ThreadFailure> {
    let mut failures = Vec::new();
    while let Ok(failure) = rx.try_recv() {
        failures.push(failure);
    }
    failures
}
