//! 轮询原语测试

use atp_polling::*;
use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, PartialEq)]
enum ProbeError {
    Unreachable,
    TimedOut(String),
}

impl From<WaitTimedOut<u32>> for ProbeError {
    fn from(err: WaitTimedOut<u32>) -> Self {
        ProbeError::TimedOut(err.message)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[test]
fn test_counter_returns_three_after_three_probes() {
    let counter = Cell::new(0u32);
    let ret = wait(
        || {
            counter.set(counter.get() + 1);
            counter.get()
        },
        |v| *v >= 3,
        Duration::from_secs(5),
        Duration::from_millis(100),
    )
    .unwrap();

    assert_eq!(ret, 3);
    assert_eq!(counter.get(), 3);
}

#[test]
fn test_zero_timeout_still_probes_once() {
    let calls = Cell::new(0);
    let result = Poller::new()
        .condition(|_: &()| false)
        .timeout(Duration::ZERO)
        .interval(Duration::from_millis(1))
        .wait(|| calls.set(calls.get() + 1));

    assert!(result.is_err());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_zero_timeout_succeeds_when_condition_holds() {
    let ret = Poller::new()
        .condition(|v: &u8| *v == 1)
        .timeout(Duration::ZERO)
        .wait(|| 1u8)
        .unwrap();
    assert_eq!(ret, 1);
}

#[test]
fn test_no_sleep_after_success() {
    // 间隔很长：若成功后仍休眠，测试会明显变慢
    let start = Instant::now();
    let ret = Poller::new()
        .condition(|v: &&str| *v == "ACTIVE")
        .interval(Duration::from_secs(10))
        .wait(|| "ACTIVE")
        .unwrap();

    assert_eq!(ret, "ACTIVE");
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_times_out_after_timeout_elapsed() {
    let timeout = Duration::from_millis(50);
    let interval = Duration::from_millis(10);
    let calls = Cell::new(0u32);
    let start = Instant::now();

    let err = Poller::new()
        .condition(|v: &u32| *v > 1000)
        .timeout(timeout)
        .interval(interval)
        .wait(|| {
            calls.set(calls.get() + 1);
            7u32
        })
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(elapsed >= timeout);
    assert!(err.elapsed >= timeout);
    // 最多多等一个间隔，外加调度抖动
    assert!(elapsed < timeout + interval + Duration::from_millis(200));
    let max_calls = (timeout.as_millis() / interval.as_millis()) as u32 + 1;
    assert!(calls.get() >= 1);
    assert!(calls.get() <= max_calls, "探测了 {} 次", calls.get());
    assert_eq!(err.last_result, 7);
    assert!(err.message.contains("未满足"));
}

#[test]
fn test_probe_error_propagates_immediately() {
    let calls = Cell::new(0);
    let result: Result<u32, ProbeError> = Poller::new()
        .condition(|_: &u32| false)
        .timeout(Duration::from_secs(5))
        .interval(Duration::from_millis(1))
        .try_wait(|| {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                Err(ProbeError::Unreachable)
            } else {
                Ok(0)
            }
        });

    assert_eq!(result.unwrap_err(), ProbeError::Unreachable);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_timeout_converts_into_caller_error() {
    let result: Result<u32, ProbeError> = Poller::new()
        .condition(|_: &u32| false)
        .timeout(Duration::ZERO)
        .interval(Duration::from_millis(1))
        .timeout_message("HA 未收敛")
        .try_wait(|| Ok(0));

    assert_eq!(
        result.unwrap_err(),
        ProbeError::TimedOut("HA 未收敛".to_string())
    );
}

#[test]
fn test_wait_args_forwards_arguments() {
    let devices = vec!["bigiq-1".to_string(), "bigiq-2".to_string()];
    let seen = Cell::new(0usize);

    let ret = Poller::new()
        .condition(|n: &usize| *n == 2)
        .interval(Duration::from_millis(1))
        .wait_args(&devices[..], |devs| {
            seen.set(seen.get() + 1);
            devs.len().min(seen.get())
        })
        .unwrap();

    assert_eq!(ret, 2);
    assert_eq!(seen.get(), 2);
}
