use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::Money;

/// 延滞料
///
/// 生成した貸出にのみ属する。返却時に延滞していれば作られ、
/// 支払い時に`paid = true`になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub amount: Money,
    pub paid: bool,
}

impl Fine {
    pub fn unpaid(amount: Money) -> Self {
        Self {
            amount,
            paid: false,
        }
    }

    pub fn settle(self) -> Self {
        Self { paid: true, ..self }
    }
}

/// 純粋関数：延滞料を計算する
///
/// `amount = daily_rate * overdue_days`。呼び出し側は延滞日数が正のときだけ呼ぶ。
pub fn compute_fine(overdue_days: u32, daily_rate: Money) -> Money {
    debug_assert!(overdue_days > 0, "compute_fine called without overdue days");
    daily_rate.times(overdue_days)
}

/// 延滞期間を日数に切り上げる
///
/// 延滞していない（0以下）場合は`None`。1秒でも過ぎれば1日と数える。
pub fn overdue_days(overdue: Duration) -> Option<u32> {
    if overdue <= Duration::zero() {
        return None;
    }
    let whole = overdue.num_days();
    let days = if overdue > Duration::days(whole) {
        whole + 1
    } else {
        whole
    };
    Some(u32::try_from(days).unwrap_or(u32::MAX))
}
