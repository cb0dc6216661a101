//! 重试与退避策略
//!
//! ## 职责
//! - 包装任意一次外部调用，按错误分类决定是否重试
//! - 退避时间 `min(initial * 2^(attempt-1), max)`，默认加全范围抖动 `[0, delay]`
//! - 每次尝试输出一条结构化日志（attempt / max_attempts / delay_ms / class）
//! - 次数用尽时返回 `RetriesExhausted`，内部保留最后一次错误，分类不变
//!
//! 退避序列与重试循环由 `tokio-retry2` 提供；致命错误与配置错误映射为
//! `RetryError::Permanent`，直接返回，不等待。

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio_retry2::strategy::{jitter, ExponentialBackoff};
use tokio_retry2::{RetryError, RetryIf};
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult, ErrorClass};
use crate::models::PipelineOptions;

/// 可重试错误
pub trait RetryableError {
    fn error_class(&self) -> ErrorClass;

    fn should_retry(&self) -> bool {
        self.error_class().is_retryable()
    }
}

impl RetryableError for AppError {
    fn error_class(&self) -> ErrorClass {
        self.classification()
    }
}

/// 抖动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// 在 `[0, delay]` 内均匀取值
    Full,
    /// 不加抖动（测试用）
    None,
}

/// 退避策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&PipelineOptions::default())
    }
}

impl RetryPolicy {
    pub fn from_options(options: &PipelineOptions) -> Self {
        let secs = |s: f64| Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO);
        Self {
            max_attempts: options.max_retries.max(1),
            initial_delay: secs(options.initial_wait),
            max_delay: secs(options.max_wait),
            jitter: Jitter::Full,
        }
    }

    /// 未加抖动的退避序列：`initial, 2*initial, 4*initial, ...`，不超过 `max_delay`
    ///
    /// `ExponentialBackoff::from_millis(2)` 产生 `2^n * factor`，
    /// 上限放大一倍后整体减半即得到从 `initial` 开始的序列。
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let initial_ms = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor(initial_ms)
            .max_delay(self.max_delay.saturating_mul(2))
            .map(|d| d / 2)
    }

    /// 第 `attempt` 次失败后的基础退避（未加抖动）
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.backoff()
            .nth(attempt.saturating_sub(1) as usize)
            .unwrap_or(self.max_delay)
    }

    /// 实际使用的等待序列，共 `max_attempts - 1` 项
    fn strategy(&self) -> impl Iterator<Item = Duration> {
        let mode = self.jitter;
        self.backoff()
            .map(move |d| match mode {
                Jitter::Full => jitter(d),
                Jitter::None => d,
            })
            .take(self.max_attempts.max(1) as usize - 1)
    }
}

/// 单次尝试的记录
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// 成功时为 `None`
    pub class: Option<ErrorClass>,
    /// 本次失败后等待的时长；成功或不再重试时为零
    pub delay: Duration,
}

/// 带退避重试地执行 `op`
///
/// # 参数
/// - `policy`: 退避策略
/// - `label`: 日志中显示的操作名
/// - `op`: 每次调用返回一个新的 future
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    with_retry_recorded(policy, label, AppError::should_retry, op).await.0
}

/// 与 [`with_retry`] 相同，另外返回每次尝试的记录
///
/// `retryable` 决定一个错误是否进入退避；不可重试的错误原样返回。
pub async fn with_retry_recorded<T, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    retryable: P,
    mut op: F,
) -> (AppResult<T>, Vec<AttemptRecord>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    P: Fn(&AppError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let attempts = AtomicU32::new(0);
    let gave_up = AtomicBool::new(false);
    let records = Mutex::new(Vec::new());
    let push = |record: AttemptRecord| {
        if let Ok(mut records) = records.lock() {
            records.push(record);
        }
    };

    let action = || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = op();
        let retryable = &retryable;
        let gave_up = &gave_up;
        let push = &push;
        async move {
            match fut.await {
                Ok(value) => {
                    debug!(attempt, max_attempts, delay_ms = 0u64, class = "ok", "{} 成功", label);
                    push(AttemptRecord {
                        attempt,
                        class: None,
                        delay: Duration::ZERO,
                    });
                    Ok(value)
                }
                Err(err) if retryable(&err) => Err(RetryError::Transient {
                    err,
                    retry_after: None,
                }),
                Err(err) => {
                    let class = err.error_class();
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = 0u64,
                        class = %class,
                        "{} 失败，不可重试: {}",
                        label,
                        err
                    );
                    push(AttemptRecord {
                        attempt,
                        class: Some(class),
                        delay: Duration::ZERO,
                    });
                    gave_up.store(true, Ordering::SeqCst);
                    Err(RetryError::Permanent(err))
                }
            }
        }
    };

    let notify = |err: &AppError, delay: Duration| {
        let attempt = attempts.load(Ordering::SeqCst);
        let class = err.error_class();
        let delay_ms = delay.as_millis() as u64;
        if class == ErrorClass::Quota {
            warn!(
                attempt,
                max_attempts,
                delay_ms,
                class = %class,
                "💳 {} 额度不足，等待后重试（额度耗尽时重试通常无效）: {}",
                label,
                err
            );
        } else {
            warn!(
                attempt,
                max_attempts,
                delay_ms,
                class = %class,
                "⏳ {} 失败，{:.2} 秒后重试: {}",
                label,
                delay.as_secs_f64(),
                err
            );
        }
        push(AttemptRecord {
            attempt,
            class: Some(class),
            delay,
        });
    };

    let result = RetryIf::spawn(policy.strategy(), action, |_: &AppError| true, notify).await;

    let result = match result {
        Ok(value) => Ok(value),
        Err(err) if gave_up.load(Ordering::SeqCst) => Err(err),
        Err(err) => {
            let attempt = attempts.load(Ordering::SeqCst);
            let class = err.error_class();
            error!(
                attempt,
                max_attempts,
                delay_ms = 0u64,
                class = %class,
                "{} 重试次数用尽: {}",
                label,
                err
            );
            push(AttemptRecord {
                attempt,
                class: Some(class),
                delay: Duration::ZERO,
            });
            Err(AppError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            })
        }
    };

    let records = records.into_inner().unwrap_or_default();
    (result, records)
}
