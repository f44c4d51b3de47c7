use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;

/// 一時的な競合に対する再試行の設定
///
/// 試行は全体で`max_attempts`回まで。n回目の失敗の後は
/// `initial_backoff_ms * 2^(n-1)`だけ待つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    /// 再試行しない
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
        }
    }

    /// `attempt`回目（1始まり）が失敗した後の待ち時間
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1 << exponent))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}
