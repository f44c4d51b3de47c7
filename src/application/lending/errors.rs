use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::domain::{
    EligibilityError, LoanStatus, LoanTransitionError, RenewalError, ReservationStatus,
    ReservationTransitionError, ReserveError,
};
use crate::ports::StoreError;

/// 識別子で参照される集約の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Member,
    Item,
    Loan,
    Reservation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Member => "Member",
            Entity::Item => "Item",
            Entity::Loan => "Loan",
            Entity::Reservation => "Reservation",
        };
        f.write_str(name)
    }
}

/// 状態遷移の不正
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    /// 例: 完了済みの貸出の返却・更新
    #[error("loan is {}, expected active", .0.as_str())]
    LoanNotActive(LoanStatus),

    #[error("renewal limit reached (max {limit})")]
    RenewalLimitReached { limit: u8 },

    #[error("no outstanding fine (loan is {})", .0.as_str())]
    NoOutstandingFine(LoanStatus),

    #[error("reservation is {}, expected waiting", .0.as_str())]
    ReservationNotWaiting(ReservationStatus),
}

/// 呼び出し側が分岐に使う安定したエラー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotEligible,
    LimitExceeded,
    AlreadyOnLoan,
    QueueViolation,
    InvalidTransition,
    TooEarly,
    Overdue,
    ItemAvailable,
    AlreadyReserved,
    DuplicateCatalogNumber,
    ItemOnLoan,
    NotFound,
    Busy,
    Store,
}

/// 貸出エンジンのエラー
///
/// どの失敗でも、その操作による変更は一切永続化されない。
#[derive(Debug, Error)]
pub enum LendingError {
    /// 利用者（Member）以外による貸出・予約
    #[error("Only members may borrow or reserve items")]
    NotEligible,

    /// 貸出中＋予約待ちの上限
    #[error("Loan and reservation limit reached (max {limit})")]
    LimitExceeded { limit: usize },

    /// 資料は既に貸出中
    #[error("Item is already on loan")]
    AlreadyOnLoan,

    /// 予約待ちの先頭以外による貸出
    #[error("Only the first member in the reservation queue may borrow this item")]
    QueueViolation,

    #[error("Invalid transition: {0}")]
    InvalidTransition(InvalidTransition),

    /// 更新受付期間の前
    #[error("Too early to renew; renewals open at {opens_at}")]
    TooEarly { opens_at: DateTime<Utc> },

    /// 返却期限を過ぎた貸出の更新
    #[error("Overdue items must be returned, not renewed (due {due_date})")]
    Overdue { due_date: DateTime<Utc> },

    /// 貸出可能な資料への予約
    #[error("Item is available; only items on loan can be reserved")]
    ItemAvailable,

    #[error("Member already has a waiting reservation for this item")]
    AlreadyReserved,

    #[error("Catalog number already registered: {0}")]
    DuplicateCatalogNumber(String),

    /// 貸出中の資料の削除
    #[error("Item is referenced by an open loan")]
    ItemOnLoan,

    #[error("{0} not found")]
    NotFound(Entity),

    /// 一時的な競合が再試行上限まで続いた
    #[error("Store is busy (gave up after {attempts} attempts)")]
    Busy { attempts: u32 },

    /// ストアの障害
    #[error("Store error")]
    Store(#[source] StoreError),
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::NotEligible => ErrorKind::NotEligible,
            LendingError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            LendingError::AlreadyOnLoan => ErrorKind::AlreadyOnLoan,
            LendingError::QueueViolation => ErrorKind::QueueViolation,
            LendingError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            LendingError::TooEarly { .. } => ErrorKind::TooEarly,
            LendingError::Overdue { .. } => ErrorKind::Overdue,
            LendingError::ItemAvailable => ErrorKind::ItemAvailable,
            LendingError::AlreadyReserved => ErrorKind::AlreadyReserved,
            LendingError::DuplicateCatalogNumber(_) => ErrorKind::DuplicateCatalogNumber,
            LendingError::ItemOnLoan => ErrorKind::ItemOnLoan,
            LendingError::NotFound(_) => ErrorKind::NotFound,
            LendingError::Busy { .. } => ErrorKind::Busy,
            LendingError::Store(_) => ErrorKind::Store,
        }
    }

    /// 再試行で解消しうる失敗か
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, LendingError::Store(e) if e.is_transient())
    }
}

impl From<StoreError> for LendingError {
    fn from(err: StoreError) -> Self {
        LendingError::Store(err)
    }
}

impl From<EligibilityError> for LendingError {
    fn from(err: EligibilityError) -> Self {
        match err {
            EligibilityError::NotEligible => LendingError::NotEligible,
            EligibilityError::LimitExceeded { limit } => LendingError::LimitExceeded { limit },
        }
    }
}

impl From<LoanTransitionError> for LendingError {
    fn from(err: LoanTransitionError) -> Self {
        let transition = match err {
            LoanTransitionError::NotActive(status) => InvalidTransition::LoanNotActive(status),
            LoanTransitionError::NoOutstandingFine(status) => {
                InvalidTransition::NoOutstandingFine(status)
            }
        };
        LendingError::InvalidTransition(transition)
    }
}

impl From<RenewalError> for LendingError {
    fn from(err: RenewalError) -> Self {
        match err {
            RenewalError::NotActive(status) => {
                LendingError::InvalidTransition(InvalidTransition::LoanNotActive(status))
            }
            RenewalError::LimitReached { limit } => {
                LendingError::InvalidTransition(InvalidTransition::RenewalLimitReached { limit })
            }
            RenewalError::TooEarly { opens_at } => LendingError::TooEarly { opens_at },
            RenewalError::Overdue { due_date } => LendingError::Overdue { due_date },
        }
    }
}

impl From<ReserveError> for LendingError {
    fn from(err: ReserveError) -> Self {
        match err {
            ReserveError::Eligibility(e) => e.into(),
            ReserveError::ItemAvailable => LendingError::ItemAvailable,
            ReserveError::AlreadyReserved => LendingError::AlreadyReserved,
        }
    }
}

impl From<ReservationTransitionError> for LendingError {
    fn from(err: ReservationTransitionError) -> Self {
        match err {
            ReservationTransitionError::NotWaiting(status) => {
                LendingError::InvalidTransition(InvalidTransition::ReservationNotWaiting(status))
            }
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LendingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_limit_maps_to_invalid_transition() {
        let err: LendingError = RenewalError::LimitReached { limit: 2 }.into();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(
            err.to_string(),
            "Invalid transition: renewal limit reached (max 2)"
        );
    }

    #[test]
    fn test_renewal_timing_keeps_own_kinds() {
        let now = Utc::now();
        let early: LendingError = RenewalError::TooEarly { opens_at: now }.into();
        let late: LendingError = RenewalError::Overdue { due_date: now }.into();
        assert_eq!(early.kind(), ErrorKind::TooEarly);
        assert_eq!(late.kind(), ErrorKind::Overdue);
    }

    #[test]
    fn test_only_contention_is_transient() {
        assert!(LendingError::from(StoreError::Contention("lock".into())).is_transient());
        assert!(!LendingError::from(StoreError::NotFound).is_transient());
        assert!(!LendingError::QueueViolation.is_transient());
    }

    #[test]
    fn test_not_found_names_entity() {
        assert_eq!(
            LendingError::NotFound(Entity::Reservation).to_string(),
            "Reservation not found"
        );
    }
}
