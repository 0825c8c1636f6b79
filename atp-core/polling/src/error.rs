//! 等待超时错误

use std::time::Duration;
use thiserror::Error;

/// 条件在超时时间内始终未满足
///
/// 携带最后一次探测结果，调用方可据此给出更具体的诊断。
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct WaitTimedOut<T> {
    /// 可读的错误信息（自定义或默认）
    pub message: String,
    /// 最后一次探测结果
    pub last_result: T,
    /// 实际已等待时间
    pub elapsed: Duration,
}

impl<T> WaitTimedOut<T> {
    /// 取出最后一次探测结果
    pub fn into_last_result(self) -> T {
        self.last_result
    }

    /// 转换最后一次探测结果的类型
    pub fn map_last<U>(self, f: impl FnOnce(T) -> U) -> WaitTimedOut<U> {
        WaitTimedOut {
            message: self.message,
            last_result: f(self.last_result),
            elapsed: self.elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_message() {
        let err = WaitTimedOut {
            message: "BZ492375".to_string(),
            last_result: 7,
            elapsed: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "BZ492375");
    }

    #[test]
    fn test_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(WaitTimedOut {
            message: "HA 未收敛".to_string(),
            last_result: vec!["STANDBY"],
            elapsed: Duration::from_secs(1),
        });
        assert_eq!(err.to_string(), "HA 未收敛");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_map_last() {
        let err = WaitTimedOut {
            message: "pending".to_string(),
            last_result: 7u32,
            elapsed: Duration::from_millis(5),
        };
        let mapped = err.map_last(|v| format!("status={}", v));
        assert_eq!(mapped.last_result, "status=7");
        assert_eq!(mapped.message, "pending");
        assert_eq!(mapped.into_last_result(), "status=7");
    }
}
