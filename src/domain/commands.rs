use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, LoanId, MemberId, ReservationId};

/// コマンド：資料を借りる
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowItem {
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
}

/// コマンド：資料を返す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub loan_id: LoanId,
    pub returned_at: DateTime<Utc>,
}

/// コマンド：貸出を更新する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewLoan {
    pub loan_id: LoanId,
    pub renewed_at: DateTime<Utc>,
}

/// コマンド：資料を予約する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveItem {
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub reserved_at: DateTime<Utc>,
}

/// コマンド：予約を取り消す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservation {
    pub reservation_id: ReservationId,
    pub cancelled_at: DateTime<Utc>,
}

/// コマンド：延滞料を支払う
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayFine {
    pub loan_id: LoanId,
    pub paid_at: DateTime<Utc>,
}
