// 重试策略
//
// 只对分类器识别出的瞬时错误（限流）做指数退避重试，其余错误原样返回。
// 执行器不关心被包装的是什么操作。

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 默认最大重试次数
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 初始退避延迟（毫秒）
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// 最大退避延迟（毫秒）
const DEFAULT_MAX_BACKOFF_MS: u64 = 16000;

/// 重试参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 初始退避延迟（毫秒）
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 最大退避延迟（毫秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// 计算指数退避延迟
    ///
    /// # 延迟序列（默认参数）
    /// - retry=0: 1000ms
    /// - retry=1: 2000ms
    /// - retry=2: 4000ms
    /// - 最大: 16000ms
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// 重试执行器
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 执行操作
    ///
    /// # 参数
    /// * `label` - 操作名（仅用于日志）
    /// * `op` - 每次调用产生一次新的尝试
    /// * `is_transient` - 错误分类器，返回 true 才会重试
    ///
    /// # 返回
    /// 首次成功的结果；或不可重试的错误；或耗尽重试后的最后一个错误
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        label: &str,
        mut op: F,
        is_transient: C,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: Display,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!("[{}] 第 {} 次重试成功", label, retry);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !is_transient(&e) {
                        return Err(e);
                    }

                    if retry >= self.policy.max_retries {
                        warn!(
                            "[{}] 已达最大重试次数 ({})，放弃: {}",
                            label, self.policy.max_retries, e
                        );
                        return Err(e);
                    }

                    let delay = self.policy.backoff_delay(retry);
                    warn!(
                        "[{}] 触发限流，等待 {}ms 后重试 ({}/{}): {}",
                        label,
                        delay.as_millis(),
                        retry + 1,
                        self.policy.max_retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
