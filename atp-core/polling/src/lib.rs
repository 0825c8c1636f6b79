//! ATP 轮询原语
//!
//! 阻塞式等待远端异步状态变化（设备重启、HA 收敛、软件安装等）：
//! - 反复调用探测函数 (probe)
//! - 条件 (condition) 首次为真时立即返回探测结果
//! - 每次失败后可输出进度信息，然后休眠 `interval`
//! - 超过 `timeout` 仍未满足时返回 [`WaitTimedOut`]
//!
//! 探测函数自身的错误不会被当作“条件未满足”，而是立即原样返回。
//!
//! # 示例
//!
//! ```
//! use atp_polling::Poller;
//! use std::time::Duration;
//!
//! let mut count = 0;
//! let ret = Poller::new()
//!     .condition(|v: &u32| *v >= 3)
//!     .timeout(Duration::from_secs(5))
//!     .interval(Duration::from_millis(10))
//!     .wait(|| {
//!         count += 1;
//!         count
//!     })
//!     .unwrap();
//! assert_eq!(ret, 3);
//! ```

mod error;
mod poller;

pub use error::WaitTimedOut;
pub use poller::{wait, Poller, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
