use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::lending::{Availability, Outcome};
use crate::domain::{
    BorrowItem, DomainEvent, Fine, Item, ItemChanges, ItemFormat, ItemId, Loan, Member, MemberId,
    NewItem, Reservation, ReserveItem, Role,
};

// ============================================================================
// Requests
// ============================================================================

/// POST /members
#[derive(Debug, Deserialize)]
pub struct RegisterMemberRequest {
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Member
}

/// POST /items
#[derive(Debug, Deserialize)]
pub struct CatalogItemRequest {
    pub catalog_number: String,
    pub title: String,
    pub author: String,
    pub pages: u32,
    pub category: String,
    /// 省略時は紙の資料
    #[serde(default)]
    pub url: Option<String>,
}

impl CatalogItemRequest {
    pub fn into_new_item(self) -> NewItem {
        let format = match self.url {
            Some(url) => ItemFormat::Electronic { url },
            None => ItemFormat::Physical,
        };
        NewItem {
            catalog_number: self.catalog_number,
            title: self.title,
            author: self.author,
            pages: self.pages,
            category: self.category,
            format,
        }
    }
}

/// PATCH /items/:id
pub type UpdateItemRequest = ItemChanges;

/// POST /loans
#[derive(Debug, Deserialize)]
pub struct BorrowItemRequest {
    pub item_id: Uuid,
    pub member_id: Uuid,
}

impl BorrowItemRequest {
    pub fn to_command(&self, now: DateTime<Utc>) -> BorrowItem {
        BorrowItem {
            item_id: ItemId::from_uuid(self.item_id),
            member_id: MemberId::from_uuid(self.member_id),
            borrowed_at: now,
        }
    }
}

/// POST /reservations
#[derive(Debug, Deserialize)]
pub struct ReserveItemRequest {
    pub item_id: Uuid,
    pub member_id: Uuid,
}

impl ReserveItemRequest {
    pub fn to_command(&self, now: DateTime<Utc>) -> ReserveItem {
        ReserveItem {
            item_id: ItemId::from_uuid(self.item_id),
            member_id: MemberId::from_uuid(self.member_id),
            reserved_at: now,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub member_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub registered_at: DateTime<Utc>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            member_id: member.member_id.value(),
            name: member.name,
            email: member.email,
            role: member.role,
            registered_at: member.registered_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub item_id: Uuid,
    pub catalog_number: String,
    pub title: String,
    pub author: String,
    pub pages: u32,
    pub category: String,
    pub format: &'static str,
    pub url: Option<String>,
    pub cataloged_at: DateTime<Utc>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        let format = item.format.kind();
        let url = match item.format {
            ItemFormat::Electronic { url } => Some(url),
            ItemFormat::Physical => None,
        };
        Self {
            item_id: item.item_id.value(),
            catalog_number: item.catalog_number,
            title: item.title,
            author: item.author,
            pages: item.pages,
            category: item.category,
            format,
            url,
            cataloged_at: item.cataloged_at,
        }
    }
}

/// 延滞料（金額は小数2桁の文字列）
#[derive(Debug, Serialize)]
pub struct FineResponse {
    pub amount: String,
    pub paid: bool,
}

impl From<Fine> for FineResponse {
    fn from(fine: Fine) -> Self {
        Self {
            amount: fine.amount.to_string(),
            paid: fine.paid,
        }
    }
}

/// 貸出レスポンス（GET /loans/:id など）
#[derive(Debug, Serialize)]
pub struct LoanResponse {
    pub loan_id: Uuid,
    pub item_id: Uuid,
    pub member_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub renewal_count: u8,
    pub renewal_limit: u8,
    pub status: &'static str,
    pub fine: Option<FineResponse>,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        Self {
            loan_id: loan.loan_id.value(),
            item_id: loan.item_id.value(),
            member_id: loan.member_id.value(),
            borrowed_at: loan.borrowed_at,
            due_date: loan.due_date(),
            returned_at: loan.returned_at,
            settled_at: loan.settled_at,
            renewal_count: loan.renewal_count.value(),
            renewal_limit: loan.terms.renewal_limit,
            status: loan.status.as_str(),
            fine: loan.fine.map(FineResponse::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub item_id: Uuid,
    pub member_id: Uuid,
    pub reserved_at: DateTime<Utc>,
    pub status: &'static str,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            reservation_id: reservation.reservation_id.value(),
            item_id: reservation.item_id.value(),
            member_id: reservation.member_id.value(),
            reserved_at: reservation.reserved_at,
            status: reservation.status.as_str(),
            closed_at: reservation.closed_at,
        }
    }
}

/// 状態を変える操作のレスポンス（集約＋発生したイベント）
#[derive(Debug, Serialize)]
pub struct OutcomeResponse<T> {
    #[serde(flatten)]
    pub value: T,
    pub events: Vec<DomainEvent>,
}

impl<T, R: From<T>> From<Outcome<T>> for OutcomeResponse<R> {
    fn from(outcome: Outcome<T>) -> Self {
        Self {
            value: R::from(outcome.value),
            events: outcome.events,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub item_id: Uuid,
    pub available: bool,
    pub waiting: usize,
}

impl From<Availability> for AvailabilityResponse {
    fn from(availability: Availability) -> Self {
        Self {
            item_id: availability.item_id.value(),
            available: availability.available,
            waiting: availability.waiting,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
