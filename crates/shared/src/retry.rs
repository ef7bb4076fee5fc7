//! 外部调用的指数退避重试
//!
//! 是否可重试由调用方的 `is_retryable` 闭包判定，这里只负责计次与等待。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// 退避参数，第 n 次重试前等待 `initial_delay * multiplier^n`，不超过 `max_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 不含首次调用
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// 执行 operation，可重试错误按策略退避后再试，其余错误立即返回
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retry = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(operation = operation_name, retry, "重试后成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) || retry >= policy.max_retries {
            warn!(
                operation = operation_name,
                retry,
                error = %err,
                "调用失败，不再重试"
            );
            return Err(err);
        }

        let delay = policy.backoff(retry);
        debug!(
            operation = operation_name,
            retry,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "调用失败，退避后重试"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}
