use super::rows::{
    ITEM_COLUMNS, LOAN_COLUMNS, MEMBER_COLUMNS, RESERVATION_COLUMNS, item_format_columns,
    item_from_row, loan_from_row, member_from_row, reservation_from_row,
};
use crate::domain::{
    Item, ItemId, Loan, LoanId, Member, MemberId, Reservation, ReservationId, ReservationStatus,
};
use crate::ports::store::Result;
use crate::ports::{
    ItemRepository, LoanRepository, MemberRepository, ReservationRepository, Store, StoreError,
    UnitOfWork,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Translate a sqlx error into the store's error categories
///
/// Serialization failures, deadlocks, lock timeouts and pool exhaustion are
/// transient and reported as `Contention`.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code().map(|c| c.into_owned());
        match code.as_deref() {
            Some(UNIQUE_VIOLATION | FOREIGN_KEY_VIOLATION | CHECK_VIOLATION) => {
                return StoreError::Constraint {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE) => {
                return StoreError::Contention(db.message().to_string());
            }
            _ => {}
        }
    }
    if matches!(err, sqlx::Error::PoolTimedOut) {
        return StoreError::Contention("connection pool timed out".to_string());
    }
    StoreError::Backend(Box::new(err))
}

/// PostgreSQL implementation of `Store`
///
/// Each unit of work is a READ COMMITTED transaction. Rows fetched through
/// `find_by_id` are locked with `FOR UPDATE` until commit or rollback, and
/// lock waits are bounded by `lock_timeout` so a stuck lock surfaces as
/// `StoreError::Contention`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: 2_000,
        }
    }

    pub fn with_lock_timeout_ms(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // SET LOCAL does not accept bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A single PostgreSQL transaction shared by all repositories
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn members(&mut self) -> &mut dyn MemberRepository {
        self
    }

    fn items(&mut self) -> &mut dyn ItemRepository {
        self
    }

    fn loans(&mut self) -> &mut dyn LoanRepository {
        self
    }

    fn reservations(&mut self) -> &mut dyn ReservationRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl MemberRepository for PgUnitOfWork {
    async fn create(&mut self, member: &Member) -> Result<MemberId> {
        sqlx::query(
            r#"
            INSERT INTO members (member_id, name, email, role, registered_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(member.member_id.value())
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.role.as_str())
        .bind(member.registered_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(member.member_id)
    }

    async fn find_by_id(&mut self, member_id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM members WHERE member_id = $1 FOR UPDATE",
            MEMBER_COLUMNS
        ))
        .bind(member_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(member_from_row).transpose()
    }

    async fn delete(&mut self, member_id: MemberId) -> Result<()> {
        let result = sqlx::query("DELETE FROM members WHERE member_id = $1")
            .bind(member_id.value())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for PgUnitOfWork {
    async fn create(&mut self, item: &Item) -> Result<ItemId> {
        let (format, url) = item_format_columns(&item.format);
        sqlx::query(
            r#"
            INSERT INTO items (
                item_id,
                catalog_number,
                title,
                author,
                pages,
                category,
                format,
                url,
                cataloged_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.item_id.value())
        .bind(&item.catalog_number)
        .bind(&item.title)
        .bind(&item.author)
        .bind(i32::try_from(item.pages).unwrap_or(i32::MAX))
        .bind(&item.category)
        .bind(format)
        .bind(url)
        .bind(item.cataloged_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(item.item_id)
    }

    async fn find_by_id(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM items WHERE item_id = $1 FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(item_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn find_by_catalog_number(&mut self, catalog_number: &str) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM items WHERE catalog_number = $1",
            ITEM_COLUMNS
        ))
        .bind(catalog_number)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn update(&mut self, item: &Item) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET title = $2, author = $3, category = $4
            WHERE item_id = $1
            "#,
        )
        .bind(item.item_id.value())
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.category)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&mut self, item_id: ItemId) -> Result<()> {
        let result = sqlx::query("DELETE FROM items WHERE item_id = $1")
            .bind(item_id.value())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl LoanRepository for PgUnitOfWork {
    async fn create(&mut self, loan: &Loan) -> Result<LoanId> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id,
                item_id,
                member_id,
                borrowed_at,
                returned_at,
                settled_at,
                renewal_count,
                status,
                loan_period_days,
                renewal_limit,
                daily_fine,
                fine_amount,
                fine_paid
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.item_id.value())
        .bind(loan.member_id.value())
        .bind(loan.borrowed_at)
        .bind(loan.returned_at)
        .bind(loan.settled_at)
        .bind(loan.renewal_count.value() as i16)
        .bind(loan.status.as_str())
        .bind(i32::try_from(loan.terms.loan_period_days).unwrap_or(i32::MAX))
        .bind(loan.terms.renewal_limit as i16)
        .bind(loan.terms.daily_fine.amount())
        .bind(loan.fine.map(|f| f.amount.amount()))
        .bind(loan.fine.map(|f| f.paid))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(loan.loan_id)
    }

    async fn find_by_id(&mut self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE loan_id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(loan_from_row).transpose()
    }

    async fn list_active_by_item(&mut self, item_id: ItemId) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE item_id = $1 AND status IN ('active', 'fined')",
            LOAN_COLUMNS
        ))
        .bind(item_id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(loan_from_row).collect()
    }

    async fn list_by_item(&mut self, item_id: ItemId) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE item_id = $1 ORDER BY borrowed_at ASC, loan_id ASC",
            LOAN_COLUMNS
        ))
        .bind(item_id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(loan_from_row).collect()
    }

    async fn list_by_member(&mut self, member_id: MemberId) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE member_id = $1 ORDER BY borrowed_at ASC, loan_id ASC",
            LOAN_COLUMNS
        ))
        .bind(member_id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(loan_from_row).collect()
    }

    async fn update_status(&mut self, loan: &Loan) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET
                status = $2,
                returned_at = $3,
                settled_at = $4,
                renewal_count = $5,
                fine_amount = $6,
                fine_paid = $7
            WHERE loan_id = $1
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.status.as_str())
        .bind(loan.returned_at)
        .bind(loan.settled_at)
        .bind(loan.renewal_count.value() as i16)
        .bind(loan.fine.map(|f| f.amount.amount()))
        .bind(loan.fine.map(|f| f.paid))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationRepository for PgUnitOfWork {
    async fn create(&mut self, reservation: &Reservation) -> Result<ReservationId> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                reservation_id,
                item_id,
                member_id,
                reserved_at,
                status,
                closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.reservation_id.value())
        .bind(reservation.item_id.value())
        .bind(reservation.member_id.value())
        .bind(reservation.reserved_at)
        .bind(reservation.status.as_str())
        .bind(reservation.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(reservation.reservation_id)
    }

    async fn find_by_id(&mut self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE reservation_id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn list_waiting_by_item(&mut self, item_id: ItemId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reservations \
             WHERE item_id = $1 AND status = 'waiting' \
             ORDER BY reserved_at ASC, reservation_id ASC",
            RESERVATION_COLUMNS
        ))
        .bind(item_id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn list_by_member(&mut self, member_id: MemberId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE member_id = $1 \
             ORDER BY reserved_at ASC, reservation_id ASC",
            RESERVATION_COLUMNS
        ))
        .bind(member_id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn update_status(
        &mut self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // a concurrent transition that committed first leaves the row non-waiting
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $2, closed_at = $3
            WHERE reservation_id = $1 AND status = 'waiting'
            "#,
        )
        .bind(reservation_id.value())
        .bind(status.as_str())
        .bind(closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM reservations WHERE reservation_id = $1")
                .bind(reservation_id.value())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        match current {
            None => Err(StoreError::NotFound),
            Some(current) => Err(StoreError::Contention(format!(
                "reservation {} is no longer waiting ({})",
                reservation_id, current
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_contention() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn test_row_not_found_is_backend_error() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }
}
