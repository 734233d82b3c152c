//! 指数退避重试策略。

use std::fmt::Display;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: usize,
    pub initial: Duration,
    pub ceiling: Duration,
    /// 每次等待额外叠加的最大抖动比例（0.0 ~ 1.0）。
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial: Duration::from_secs(1),
            ceiling: Duration::from_secs(8),
            jitter: 0.3,
        }
    }
}

impl Backoff {
    pub fn new(max_attempts: usize, initial: Duration, ceiling: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial,
            ceiling: ceiling.max(initial),
            ..Self::default()
        }
    }

    /// 不等待，直接重试（测试用）。
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial: Duration::ZERO,
            ceiling: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// 第 `attempt` 次失败后的基础等待（不含抖动），attempt 从 1 开始。
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.initial
            .saturating_mul(1u32 << shift)
            .min(self.ceiling)
    }

    /// 执行 `op`，仅对 `is_transient` 判定为瞬时的错误重试。
    ///
    /// 最后一次尝试失败后不再等待，直接返回该错误。
    pub fn run<T, E, F, P>(&self, label: &str, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_transient(&err) => {
                    let wait = self.delay_for(attempt) + jitter(self.delay_for(attempt), self.jitter);
                    debug!(
                        target: "retry",
                        "{label} 第 {attempt}/{attempts} 次失败: {err}，{:.1}s 后重试",
                        wait.as_secs_f32()
                    );
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn jitter(base: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 || base.is_zero() {
        return Duration::ZERO;
    }
    // 当前时间的纳秒部分映射到 [0, 1)
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let bucket = f64::from(nanos % 10_000) / 10_000.0;
    base.mul_f64(bucket * ratio.min(1.0))
}
