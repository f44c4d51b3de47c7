use crate::domain::{
    Fine, Item, ItemFormat, ItemId, Loan, LoanId, LoanStatus, LoanTerms, Member, MemberId, Money,
    RenewalCount, Reservation, ReservationId, ReservationStatus, Role,
};
use crate::ports::StoreError;
use crate::ports::store::Result;
use rust_decimal::Decimal;
use sqlx::{Row, postgres::PgRow};
use std::str::FromStr;

pub(super) const MEMBER_COLUMNS: &str = "member_id, name, email, role, registered_at";

pub(super) const ITEM_COLUMNS: &str =
    "item_id, catalog_number, title, author, pages, category, format, url, cataloged_at";

pub(super) const LOAN_COLUMNS: &str = "loan_id, item_id, member_id, borrowed_at, returned_at, \
     settled_at, renewal_count, status, loan_period_days, renewal_limit, daily_fine, \
     fine_amount, fine_paid";

pub(super) const RESERVATION_COLUMNS: &str =
    "reservation_id, item_id, member_id, reserved_at, status, closed_at";

/// Wrap a malformed column value as a backend error
fn invalid_data(message: impl Into<String>) -> StoreError {
    StoreError::Backend(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.into(),
    )))
}

fn money(column: &str, value: Decimal) -> Result<Money> {
    Money::new(value).map_err(|e| invalid_data(format!("{}: {}", column, e)))
}

pub(super) fn member_from_row(row: &PgRow) -> Result<Member> {
    let role: &str = row.get("role");
    Ok(Member {
        member_id: MemberId::from_uuid(row.get("member_id")),
        name: row.get("name"),
        email: row.get("email"),
        role: Role::from_str(role).map_err(invalid_data)?,
        registered_at: row.get("registered_at"),
    })
}

pub(super) fn item_from_row(row: &PgRow) -> Result<Item> {
    let pages: i32 = row.get("pages");
    let format: &str = row.get("format");
    let url: Option<String> = row.get("url");

    let format = match (format, url) {
        ("physical", _) => ItemFormat::Physical,
        ("electronic", Some(url)) => ItemFormat::Electronic { url },
        (other, _) => return Err(invalid_data(format!("invalid item format: {}", other))),
    };

    Ok(Item {
        item_id: ItemId::from_uuid(row.get("item_id")),
        catalog_number: row.get("catalog_number"),
        title: row.get("title"),
        author: row.get("author"),
        pages: pages
            .try_into()
            .map_err(|_| invalid_data(format!("pages out of range: {}", pages)))?,
        category: row.get("category"),
        format,
        cataloged_at: row.get("cataloged_at"),
    })
}

pub(super) fn item_format_columns(format: &ItemFormat) -> (&'static str, Option<&str>) {
    match format {
        ItemFormat::Physical => (format.kind(), None),
        ItemFormat::Electronic { url } => (format.kind(), Some(url.as_str())),
    }
}

pub(super) fn loan_from_row(row: &PgRow) -> Result<Loan> {
    let renewal_count: i16 = row.get("renewal_count");
    let renewal_count: u8 = renewal_count
        .try_into()
        .map_err(|_| invalid_data(format!("renewal_count out of range: {}", renewal_count)))?;

    let status: &str = row.get("status");
    let status = LoanStatus::from_str(status).map_err(invalid_data)?;

    let loan_period_days: i32 = row.get("loan_period_days");
    let renewal_limit: i16 = row.get("renewal_limit");
    let terms = LoanTerms {
        loan_period_days: loan_period_days
            .try_into()
            .map_err(|_| invalid_data(format!("loan_period_days out of range: {}", loan_period_days)))?,
        renewal_limit: renewal_limit
            .try_into()
            .map_err(|_| invalid_data(format!("renewal_limit out of range: {}", renewal_limit)))?,
        daily_fine: money("daily_fine", row.get("daily_fine"))?,
    };

    let fine_amount: Option<Decimal> = row.get("fine_amount");
    let fine_paid: Option<bool> = row.get("fine_paid");
    let fine = match (fine_amount, fine_paid) {
        (Some(amount), Some(paid)) => Some(Fine {
            amount: money("fine_amount", amount)?,
            paid,
        }),
        (None, None) => None,
        _ => return Err(invalid_data("fine_amount and fine_paid must be set together")),
    };

    Ok(Loan {
        loan_id: LoanId::from_uuid(row.get("loan_id")),
        item_id: ItemId::from_uuid(row.get("item_id")),
        member_id: MemberId::from_uuid(row.get("member_id")),
        borrowed_at: row.get("borrowed_at"),
        returned_at: row.get("returned_at"),
        settled_at: row.get("settled_at"),
        renewal_count: RenewalCount::from(renewal_count),
        status,
        fine,
        terms,
    })
}

pub(super) fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    let status: &str = row.get("status");
    Ok(Reservation {
        reservation_id: ReservationId::from_uuid(row.get("reservation_id")),
        item_id: ItemId::from_uuid(row.get("item_id")),
        member_id: MemberId::from_uuid(row.get("member_id")),
        reserved_at: row.get("reserved_at"),
        status: ReservationStatus::from_str(status).map_err(invalid_data)?,
        closed_at: row.get("closed_at"),
    })
}
