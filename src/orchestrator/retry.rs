//! 重试调度 - 编排层
//!
//! 失败分类完全信任执行器的回报；这里只独立执行尝试次数上限这一条硬规则。
//!
//! | 类型 | 策略 |
//! |---|---|
//! | ElementNotFound / TransientUi / Network / Timeout | 指数退避后重试 |
//! | DataValidation | 直接进死信，原因为校验详情 |
//! | PermanentUi | 直接进死信 |
//! | 达到上限 | 无论何种类型都进死信（MaxAttemptsExceeded） |

use std::time::Duration;

use crate::config::Config;
use crate::models::{DeadLetterReason, ErrorKind, JobError};

/// 调度决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 退避后重新入队
    Requeue { delay: Duration },
    /// 进入死信区
    DeadLetter(DeadLetterReason),
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
            backoff_cap: config.backoff_cap(),
            jitter: config.backoff_jitter,
        }
    }

    /// 第 `attempt` 次尝试失败后的退避时长：base * 2^(attempt-1)，封顶
    ///
    /// 抖动最多增加 10%，仍受上限约束。
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base_ms = self.backoff_base.as_millis() as u64;
        let multiplied = base_ms.saturating_mul(1u64 << exponent);

        let with_jitter = if self.jitter {
            let jitter = rand::random::<f64>() * multiplied as f64 * 0.1;
            multiplied.saturating_add(jitter as u64)
        } else {
            multiplied
        };

        Duration::from_millis(with_jitter).min(self.backoff_cap)
    }

    /// 根据失败和已用尝试次数做出决定
    pub fn decide(&self, attempt_count: u32, error: &JobError) -> RetryDecision {
        if !error.kind.is_retryable() {
            return RetryDecision::DeadLetter(DeadLetterReason {
                kind: error.kind,
                detail: error.to_string(),
            });
        }

        if attempt_count >= self.max_attempts {
            return RetryDecision::DeadLetter(self.exhausted(attempt_count, Some(error)));
        }

        RetryDecision::Requeue {
            delay: self.backoff_delay(attempt_count),
        }
    }

    /// 尝试次数耗尽的死信原因
    pub fn exhausted(&self, attempt_count: u32, last_error: Option<&JobError>) -> DeadLetterReason {
        let detail = match last_error {
            Some(e) => format!("已尝试 {}/{} 次，最后一次失败: {}", attempt_count, self.max_attempts, e),
            None => format!("已尝试 {}/{} 次", attempt_count, self.max_attempts),
        };
        DeadLetterReason {
            kind: ErrorKind::MaxAttemptsExceeded,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(1_000),
            jitter: false,
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = policy();
        assert_eq!(p.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(p.backoff_delay(4), Duration::from_millis(800));
        assert_eq!(p.backoff_delay(5), Duration::from_millis(1_000));
        assert_eq!(p.backoff_delay(60), Duration::from_millis(1_000));
    }

    #[test]
    fn backoff_is_non_decreasing() {
        let p = policy();
        let delays: Vec<_> = (1..=40).map(|k| p.backoff_delay(k)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= p.backoff_cap));
    }

    #[test]
    fn jitter_stays_under_cap() {
        let p = RetryPolicy {
            jitter: true,
            ..policy()
        };
        for k in 1..=10 {
            assert!(p.backoff_delay(k) <= p.backoff_cap);
            assert!(p.backoff_delay(k) >= policy().backoff_delay(k));
        }
    }

    #[test]
    fn transient_failures_requeue_until_ceiling() {
        let p = policy();
        let err = JobError::new(ErrorKind::ElementNotFound, "selector miss", Some("x".into()));
        assert_eq!(
            p.decide(2, &err),
            RetryDecision::Requeue {
                delay: Duration::from_millis(200)
            }
        );
        match p.decide(5, &err) {
            RetryDecision::DeadLetter(reason) => {
                assert_eq!(reason.kind, ErrorKind::MaxAttemptsExceeded)
            }
            other => panic!("应进入死信: {:?}", other),
        }
    }

    #[test]
    fn permanent_failures_never_retry() {
        let p = policy();
        for kind in [ErrorKind::DataValidation, ErrorKind::PermanentUi] {
            let err = JobError::new(kind, "bad", None);
            match p.decide(1, &err) {
                RetryDecision::DeadLetter(reason) => {
                    assert_eq!(reason.kind, kind);
                    assert!(reason.detail.contains("bad"));
                }
                other => panic!("应直接进入死信: {:?}", other),
            }
        }
    }
}
