//! 轮询器实现

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::WaitTimedOut;

/// 默认超时时间
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// 默认轮询间隔
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// 最小轮询间隔，`interval(Duration::ZERO)` 会被提升到该值
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// 一次等待操作的描述
///
/// 每次调用 `wait*` 都是独立的，`Poller` 本身不在调用之间保存任何状态，
/// 因此同一个 `Poller` 可以被重复使用。
pub struct Poller<'a, T> {
    condition: Box<dyn Fn(&T) -> bool + 'a>,
    progress: Option<Box<dyn Fn(&T) -> String + 'a>>,
    timeout: Duration,
    interval: Duration,
    timeout_message: Option<String>,
}

impl<'a, T> Default for Poller<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> Poller<'a, T> {
    /// 创建轮询器（条件恒为真，默认超时和间隔）
    pub fn new() -> Self {
        Self {
            condition: Box::new(|_| true),
            progress: None,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
            timeout_message: None,
        }
    }

    /// 设置成功条件
    pub fn condition(mut self, condition: impl Fn(&T) -> bool + 'a) -> Self {
        self.condition = Box::new(condition);
        self
    }

    /// 设置进度回调，返回的文本会写入日志
    pub fn progress(mut self, progress: impl Fn(&T) -> String + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// 设置超时时间
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 设置轮询间隔
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// 设置超时时的自定义错误信息
    pub fn timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = Some(message.into());
        self
    }

    /// 获取超时时间
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// 获取轮询间隔
    pub fn get_interval(&self) -> Duration {
        self.interval
    }

    /// 等待直到条件满足
    ///
    /// 探测函数不会失败时使用。
    pub fn wait<F>(&self, mut probe: F) -> Result<T, WaitTimedOut<T>>
    where
        F: FnMut() -> T,
    {
        self.try_wait(|| Ok::<T, WaitTimedOut<T>>(probe()))
    }

    /// 等待直到条件满足（探测函数可能失败）
    ///
    /// 探测函数返回的错误会立即原样返回，不会重试；
    /// 超时则通过 `From<WaitTimedOut<T>>` 转换为调用方的错误类型。
    pub fn try_wait<F, E>(&self, mut probe: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: From<WaitTimedOut<T>>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            let ret = probe()?;
            attempts += 1;

            if (self.condition)(&ret) {
                debug!("条件已满足: 探测 {} 次, 耗时 {:?}", attempts, start.elapsed());
                return Ok(ret);
            }

            if let Some(progress) = &self.progress {
                info!("{}", progress(&ret));
            }

            thread::sleep(self.interval);

            let elapsed = start.elapsed();
            if elapsed > self.timeout {
                let message = self.timeout_message.clone().unwrap_or_else(|| {
                    format!("条件在 {:?} 内未满足 (共探测 {} 次)", elapsed, attempts)
                });
                warn!("等待超时: {}", message);
                return Err(WaitTimedOut {
                    message,
                    last_result: ret,
                    elapsed,
                }
                .into());
            }
        }
    }

    /// 等待直到条件满足，每次探测都把 `args` 传给探测函数
    pub fn wait_args<A, F>(&self, args: &A, mut probe: F) -> Result<T, WaitTimedOut<T>>
    where
        A: ?Sized,
        F: FnMut(&A) -> T,
    {
        self.wait(|| probe(args))
    }

    /// [`Poller::wait_args`] 的可失败版本
    pub fn try_wait_args<A, F, E>(&self, args: &A, mut probe: F) -> Result<T, E>
    where
        A: ?Sized,
        F: FnMut(&A) -> Result<T, E>,
        E: From<WaitTimedOut<T>>,
    {
        self.try_wait(|| probe(args))
    }
}

/// 常用场景的简写：给定探测函数、条件、超时和间隔
pub fn wait<T, F, C>(
    probe: F,
    condition: C,
    timeout: Duration,
    interval: Duration,
) -> Result<T, WaitTimedOut<T>>
where
    F: FnMut() -> T,
    C: Fn(&T) -> bool,
{
    Poller::new()
        .condition(condition)
        .timeout(timeout)
        .interval(interval)
        .wait(probe)
}
