use chrono::{DateTime, Utc};

use super::{LoanStatus, RenewalCountError, ReservationStatus};

/// 利用資格のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityError {
    /// 利用者（Member）以外は借りられない・予約できない
    NotEligible,
    /// 貸出中＋予約待ちの合計が上限に達している
    LimitExceeded { limit: usize },
}

/// 返却・支払いのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanTransitionError {
    /// 貸出中（Active）ではない
    NotActive(LoanStatus),
    /// 未払いの延滞料がない
    NoOutstandingFine(LoanStatus),
}

/// 更新のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    /// 貸出中（Active）ではない
    NotActive(LoanStatus),
    /// 更新回数の上限に達した
    LimitReached { limit: u8 },
    /// 更新受付期間の前
    TooEarly { opens_at: DateTime<Utc> },
    /// 返却期限を過ぎている（返却が必要）
    Overdue { due_date: DateTime<Utc> },
}

impl From<RenewalCountError> for RenewalError {
    fn from(err: RenewalCountError) -> Self {
        match err {
            RenewalCountError::LimitReached { limit } => RenewalError::LimitReached { limit },
        }
    }
}

/// 予約作成のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveError {
    Eligibility(EligibilityError),
    /// 貸出可能な資料は予約できない
    ItemAvailable,
    /// 同じ資料に予約待ちが既にある
    AlreadyReserved,
}

impl ReserveError {
    pub fn eligibility(&self) -> Option<&EligibilityError> {
        match self {
            ReserveError::Eligibility(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EligibilityError> for ReserveError {
    fn from(err: EligibilityError) -> Self {
        ReserveError::Eligibility(err)
    }
}

/// 予約の状態遷移エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationTransitionError {
    /// 予約待ち（Waiting）ではない
    NotWaiting(ReservationStatus),
}
