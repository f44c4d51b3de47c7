use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::Money;

/// 貸出期間の既定値（日数）
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 14;
/// 貸出期間の上限（日数）
pub const MAX_LOAN_PERIOD_DAYS: u32 = 3650;
/// 更新回数の既定上限
pub const DEFAULT_RENEWAL_LIMIT: u8 = 2;
/// 更新受付を開始する返却期限前の日数
pub const DEFAULT_RENEWAL_WINDOW_DAYS: u32 = 2;
/// 資料が返ってきてから予約を保持する日数
pub const DEFAULT_RESERVATION_VALIDITY_DAYS: u32 = 3;
/// 利用者1人あたりの貸出中＋予約待ちの上限
pub const DEFAULT_CONCURRENT_LIMIT: usize = 3;

/// 貸出ごとに凍結される条件
///
/// 貸出作成時の方針を複製して保持する。運用中に方針が変わっても、
/// 既存の貸出の返却期限・更新上限・延滞料は作成時の値で計算される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub loan_period_days: u32,
    pub renewal_limit: u8,
    pub daily_fine: Money,
}

impl LoanTerms {
    pub fn loan_period(&self) -> Duration {
        Duration::days(i64::from(self.loan_period_days))
    }
}

impl Default for LoanTerms {
    fn default() -> Self {
        LendingPolicy::default().loan_terms()
    }
}

/// 貸出・予約の運用方針
///
/// `loan_terms()` で新規貸出に凍結する部分を取り出す。残りの項目
/// （更新受付期間・予約保持期間・同時上限）は評価時点の値を使う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingPolicy {
    pub loan_period_days: u32,
    pub renewal_limit: u8,
    pub daily_fine: Money,
    pub renewal_window_days: u32,
    pub reservation_validity_days: u32,
    pub concurrent_limit: usize,
}

impl LendingPolicy {
    pub fn loan_terms(&self) -> LoanTerms {
        LoanTerms {
            loan_period_days: self.loan_period_days,
            renewal_limit: self.renewal_limit,
            daily_fine: self.daily_fine,
        }
    }

    pub fn renewal_window(&self) -> Duration {
        Duration::days(i64::from(self.renewal_window_days))
    }

    pub fn reservation_validity(&self) -> Duration {
        Duration::days(i64::from(self.reservation_validity_days))
    }
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            renewal_limit: DEFAULT_RENEWAL_LIMIT,
            daily_fine: Money::ONE,
            renewal_window_days: DEFAULT_RENEWAL_WINDOW_DAYS,
            reservation_validity_days: DEFAULT_RESERVATION_VALIDITY_DAYS,
            concurrent_limit: DEFAULT_CONCURRENT_LIMIT,
        }
    }
}
