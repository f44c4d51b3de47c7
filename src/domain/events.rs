use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Fine, ItemId, LoanId, LoanStatus, MemberId, ReservationId};

/// イベント：資料が貸し出された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBorrowed {
    pub loan_id: LoanId,
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// イベント：貸出が更新された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRenewed {
    pub loan_id: LoanId,
    pub old_due_date: DateTime<Utc>,
    pub new_due_date: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
    pub renewal_count: u8,
}

/// イベント：資料が返却された
///
/// 延滞していれば`fine`が付き、状態は`Fined`になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReturned {
    pub loan_id: LoanId,
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub returned_at: DateTime<Utc>,
    pub status: LoanStatus,
    pub fine: Option<Fine>,
}

/// イベント：延滞料が支払われた
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePaid {
    pub loan_id: LoanId,
    pub member_id: MemberId,
    pub fine: Fine,
    pub settled_at: DateTime<Utc>,
}

/// イベント：予約が作成された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReserved {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub reserved_at: DateTime<Utc>,
}

/// イベント：予約が取り消された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCancelled {
    pub reservation_id: ReservationId,
    pub cancelled_at: DateTime<Utc>,
}

/// イベント：予約が期限切れになった
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationExpired {
    pub reservation_id: ReservationId,
    pub member_id: MemberId,
    pub expired_at: DateTime<Utc>,
}

/// イベント：予約が貸出に変換された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFulfilled {
    pub reservation_id: ReservationId,
    pub loan_id: LoanId,
    pub fulfilled_at: DateTime<Utc>,
}

/// ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    ItemBorrowed(ItemBorrowed),
    LoanRenewed(LoanRenewed),
    ItemReturned(ItemReturned),
    FinePaid(FinePaid),
    ItemReserved(ItemReserved),
    ReservationCancelled(ReservationCancelled),
    ReservationExpired(ReservationExpired),
    ReservationFulfilled(ReservationFulfilled),
}

impl DomainEvent {
    /// イベント種別の識別子（ログ出力用）
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ItemBorrowed(_) => "ItemBorrowed",
            DomainEvent::LoanRenewed(_) => "LoanRenewed",
            DomainEvent::ItemReturned(_) => "ItemReturned",
            DomainEvent::FinePaid(_) => "FinePaid",
            DomainEvent::ItemReserved(_) => "ItemReserved",
            DomainEvent::ReservationCancelled(_) => "ReservationCancelled",
            DomainEvent::ReservationExpired(_) => "ReservationExpired",
            DomainEvent::ReservationFulfilled(_) => "ReservationFulfilled",
        }
    }
}
