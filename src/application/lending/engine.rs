use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    self, BorrowItem, CancelReservation, DomainEvent, Item, ItemChanges, ItemId, LendingPolicy,
    Loan, LoanId, LoanStatus, Member, MemberId, NewItem, PayFine, RenewLoan, Reservation,
    ReservationContext, ReturnItem, ReserveItem, Role, check_capacity,
};
use crate::ports::{Store, StoreError, UnitOfWork};

use super::errors::{Entity, LendingError, Result};
use super::retry::RetryPolicy;

/// 状態を変える操作の結果
///
/// `value`は操作後の集約、`events`はこの操作で起きたドメインイベント（発生順）。
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

/// 資料の貸出可否（貸出から導出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub item_id: ItemId,
    pub available: bool,
    /// 予約待ちの件数
    pub waiting: usize,
}

/// 貸出・予約のライフサイクルを管理するエンジン
///
/// 各操作は1つの作業単位（トランザクション）の中で、関係する利用者・資料を
/// ロックしてから読み・検査し・書く。検査と書き込みの間に他の操作が
/// 割り込むことはない。一時的な競合は`RetryPolicy`に従って再試行し、
/// 尽きたら`LendingError::Busy`を返す。
///
/// 時刻は呼び出し側が渡す（コマンドの`*_at`）。エンジン自身は時計を読まない。
#[derive(Clone)]
pub struct LendingEngine {
    store: Arc<dyn Store>,
    policy: LendingPolicy,
    retry: RetryPolicy,
}

impl LendingEngine {
    pub fn new(store: Arc<dyn Store>, policy: LendingPolicy) -> Self {
        Self {
            store,
            policy,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    // ------------------------------------------------------------------
    // 利用者・目録
    // ------------------------------------------------------------------

    #[instrument(skip(self, name, email))]
    pub async fn register_member(
        &self,
        name: String,
        email: String,
        role: Role,
        registered_at: DateTime<Utc>,
    ) -> Result<Member> {
        let member = Member::register(name, email, role, registered_at);
        let created = self
            .transact(move |uow| Box::pin(register_in(uow, member.clone())))
            .await?;

        info!(member_id = %created.member_id, role = created.role.as_str(), "Member registered");
        Ok(created)
    }

    /// 利用者を削除する（貸出・予約は永続化層で連鎖削除）
    #[instrument(skip(self))]
    pub async fn remove_member(&self, member_id: MemberId) -> Result<()> {
        self.transact(move |uow| Box::pin(remove_member_in(uow, member_id)))
            .await?;

        info!(%member_id, "Member removed");
        Ok(())
    }

    #[instrument(skip(self, new_item), fields(catalog_number = %new_item.catalog_number))]
    pub async fn catalog_item(&self, new_item: NewItem, cataloged_at: DateTime<Utc>) -> Result<Item> {
        let item = Item::catalog(new_item, cataloged_at);
        let created = self
            .transact(move |uow| Box::pin(catalog_in(uow, item.clone())))
            .await?;

        info!(item_id = %created.item_id, "Item cataloged");
        Ok(created)
    }

    #[instrument(skip(self, changes))]
    pub async fn update_item(&self, item_id: ItemId, changes: ItemChanges) -> Result<Item> {
        self.transact(move |uow| Box::pin(update_item_in(uow, item_id, changes.clone())))
            .await
    }

    /// 資料を目録から削除する。貸出中（Active/Fined）なら`ItemOnLoan`。
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: ItemId) -> Result<()> {
        self.transact(move |uow| Box::pin(remove_item_in(uow, item_id)))
            .await?;

        info!(%item_id, "Item removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // 貸出
    // ------------------------------------------------------------------

    /// 資料を貸し出す
    ///
    /// 検査順：利用資格 → 上限 → 貸出中 → 期限切れ予約の掃き出し → 待ち行列の先頭。
    /// 借り手が先頭の予約を持っていれば、その予約は`Fulfilled`になる。
    #[instrument(skip(self))]
    pub async fn borrow_item(&self, cmd: BorrowItem) -> Result<Outcome<Loan>> {
        let policy = self.policy.clone();
        let outcome = self
            .transact(move |uow| Box::pin(borrow_in(uow, cmd.clone(), policy.clone())))
            .await?;

        info!(
            loan_id = %outcome.value.loan_id,
            due_date = %outcome.value.due_date(),
            "Item borrowed"
        );
        Ok(outcome)
    }

    /// 資料を返却する。延滞していれば延滞料つきで`Fined`になる。
    #[instrument(skip(self))]
    pub async fn return_item(&self, cmd: ReturnItem) -> Result<Outcome<Loan>> {
        let outcome = self
            .transact(move |uow| Box::pin(return_in(uow, cmd.clone())))
            .await?;

        info!(
            loan_id = %outcome.value.loan_id,
            status = outcome.value.status.as_str(),
            "Item returned"
        );
        Ok(outcome)
    }

    /// 貸出を更新する（返却期限を1期間延ばす）
    #[instrument(skip(self))]
    pub async fn renew_loan(&self, cmd: RenewLoan) -> Result<Outcome<Loan>> {
        let window = self.policy.renewal_window();
        let outcome = self
            .transact(move |uow| Box::pin(renew_in(uow, cmd.clone(), window)))
            .await?;

        info!(
            loan_id = %outcome.value.loan_id,
            renewal_count = outcome.value.renewal_count.value(),
            due_date = %outcome.value.due_date(),
            "Loan renewed"
        );
        Ok(outcome)
    }

    /// 延滞料を支払い、貸出を完了する
    #[instrument(skip(self))]
    pub async fn pay_fine(&self, cmd: PayFine) -> Result<Outcome<Loan>> {
        let outcome = self
            .transact(move |uow| Box::pin(pay_fine_in(uow, cmd.clone())))
            .await?;

        info!(loan_id = %outcome.value.loan_id, "Fine paid");
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // 予約
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn reserve_item(&self, cmd: ReserveItem) -> Result<Outcome<Reservation>> {
        let limit = self.policy.concurrent_limit;
        let outcome = self
            .transact(move |uow| Box::pin(reserve_in(uow, cmd.clone(), limit)))
            .await?;

        info!(reservation_id = %outcome.value.reservation_id, "Item reserved");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn cancel_reservation(&self, cmd: CancelReservation) -> Result<Outcome<Reservation>> {
        let outcome = self
            .transact(move |uow| Box::pin(cancel_in(uow, cmd.clone())))
            .await?;

        info!(reservation_id = %outcome.value.reservation_id, "Reservation cancelled");
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // 照会
    // ------------------------------------------------------------------

    pub async fn loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.transact(move |uow| Box::pin(load_loan(uow, loan_id)))
            .await
    }

    pub async fn availability(&self, item_id: ItemId) -> Result<Availability> {
        self.transact(move |uow| Box::pin(availability_in(uow, item_id)))
            .await
    }

    /// 利用者の全貸出（貸出日時の順）
    pub async fn member_loans(&self, member_id: MemberId) -> Result<Vec<Loan>> {
        self.transact(move |uow| Box::pin(member_loans_in(uow, member_id)))
            .await
    }

    pub async fn member_reservations(&self, member_id: MemberId) -> Result<Vec<Reservation>> {
        self.transact(move |uow| Box::pin(member_reservations_in(uow, member_id)))
            .await
    }

    /// 資料の予約待ち（先頭から順）
    pub async fn reservation_queue(&self, item_id: ItemId) -> Result<Vec<Reservation>> {
        self.transact(move |uow| Box::pin(queue_in(uow, item_id)))
            .await
    }

    /// 未払いの延滞料がある貸出
    pub async fn outstanding_fines(&self, member_id: MemberId) -> Result<Vec<Loan>> {
        let loans = self.member_loans(member_id).await?;
        Ok(loans
            .into_iter()
            .filter(|l| l.outstanding_fine().is_some())
            .collect())
    }

    // ------------------------------------------------------------------
    // トランザクション
    // ------------------------------------------------------------------

    /// `work`を1つの作業単位で実行し、コミットする
    ///
    /// 一時的な競合（`StoreError::Contention`）で失敗した試行はロールバックして
    /// やり直す。`work`は試行ごとに呼ばれるため、副作用を外に持ち出さないこと。
    async fn transact<T, F>(&self, mut work: F) -> Result<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut dyn UnitOfWork) -> BoxFuture<'u, Result<T>> + Send,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(&mut work).await {
                Err(err) if err.is_transient() => {
                    if !self.retry.should_retry(attempt) {
                        warn!(attempt, error = %err, "Giving up after contention");
                        return Err(LendingError::Busy { attempts: attempt });
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(attempt, ?delay, error = %err, "Contention, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn attempt<T, F>(&self, work: &mut F) -> Result<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut dyn UnitOfWork) -> BoxFuture<'u, Result<T>> + Send,
    {
        let mut uow = self.store.begin().await?;
        let value = work(uow.as_mut()).await?;
        uow.commit().await?;
        Ok(value)
    }
}

// ----------------------------------------------------------------------
// 作業単位の中で実行される手続き
// ----------------------------------------------------------------------

async fn borrow_in(
    uow: &mut dyn UnitOfWork,
    cmd: BorrowItem,
    policy: LendingPolicy,
) -> Result<Outcome<Loan>> {
    // 利用者→資料の順にロックする
    let member = uow
        .members()
        .find_by_id(cmd.member_id)
        .await?
        .ok_or(LendingError::NotFound(Entity::Member))?;
    if uow.items().find_by_id(cmd.item_id).await?.is_none() {
        return Err(LendingError::NotFound(Entity::Item));
    }

    // 自分が持つこの資料の予約待ちは貸出に置き換わるので数えない
    let held = held_by(uow, member.member_id, Some(cmd.item_id)).await?;
    check_capacity(&member, held, policy.concurrent_limit)?;

    if !uow.loans().list_active_by_item(cmd.item_id).await?.is_empty() {
        return Err(LendingError::AlreadyOnLoan);
    }

    let mut events = Vec::new();

    let history = uow.loans().list_by_item(cmd.item_id).await?;
    let mut waiting = uow.reservations().list_waiting_by_item(cmd.item_id).await?;
    if let Some(available_since) = history.iter().filter_map(Loan::released_at).max() {
        let swept = domain::reservation::expiration_sweep(
            &waiting,
            available_since,
            policy.reservation_validity(),
            cmd.borrowed_at,
        );
        for (expired, event) in swept {
            debug!(reservation_id = %expired.reservation_id, "Reservation expired");
            save_reservation(uow, &expired).await?;
            waiting.retain(|r| r.reservation_id != expired.reservation_id);
            events.push(DomainEvent::ReservationExpired(event));
        }
    }

    let head = domain::reservation::head_of(&waiting).cloned();
    if let Some(head) = &head {
        if head.member_id != member.member_id {
            return Err(LendingError::QueueViolation);
        }
    }

    let (loan, borrowed) = domain::loan::borrow(
        cmd.item_id,
        member.member_id,
        cmd.borrowed_at,
        policy.loan_terms(),
    );
    uow.loans().create(&loan).await.map_err(|err| match err {
        StoreError::Constraint { .. } => LendingError::AlreadyOnLoan,
        other => other.into(),
    })?;
    events.push(DomainEvent::ItemBorrowed(borrowed));

    if let Some(head) = head {
        let (fulfilled, event) =
            domain::reservation::fulfill(&head, loan.loan_id, cmd.borrowed_at)?;
        save_reservation(uow, &fulfilled).await?;
        events.push(DomainEvent::ReservationFulfilled(event));
    }

    Ok(Outcome {
        value: loan,
        events,
    })
}

async fn reserve_in(
    uow: &mut dyn UnitOfWork,
    cmd: ReserveItem,
    limit: usize,
) -> Result<Outcome<Reservation>> {
    let member = uow
        .members()
        .find_by_id(cmd.member_id)
        .await?
        .ok_or(LendingError::NotFound(Entity::Member))?;
    if uow.items().find_by_id(cmd.item_id).await?.is_none() {
        return Err(LendingError::NotFound(Entity::Item));
    }

    let held = held_by(uow, member.member_id, None).await?;
    let item_on_loan = !uow.loans().list_active_by_item(cmd.item_id).await?.is_empty();
    let already_waiting = uow
        .reservations()
        .list_waiting_by_item(cmd.item_id)
        .await?
        .iter()
        .any(|r| r.member_id == member.member_id);

    let context = ReservationContext {
        item_on_loan,
        already_waiting,
        held,
        limit,
    };
    let (reservation, event) =
        domain::reservation::reserve(cmd.item_id, &member, cmd.reserved_at, context)?;

    uow.reservations()
        .create(&reservation)
        .await
        .map_err(|err| match err {
            StoreError::Constraint { .. } => LendingError::AlreadyReserved,
            other => other.into(),
        })?;

    Ok(Outcome {
        value: reservation,
        events: vec![DomainEvent::ItemReserved(event)],
    })
}

async fn register_in(uow: &mut dyn UnitOfWork, member: Member) -> Result<Member> {
    uow.members().create(&member).await?;
    Ok(member)
}

async fn remove_member_in(uow: &mut dyn UnitOfWork, member_id: MemberId) -> Result<()> {
    ensure_member(uow, member_id).await?;
    uow.members()
        .delete(member_id)
        .await
        .map_err(not_found(Entity::Member))
}

async fn update_item_in(
    uow: &mut dyn UnitOfWork,
    item_id: ItemId,
    changes: ItemChanges,
) -> Result<Item> {
    let item = uow
        .items()
        .find_by_id(item_id)
        .await?
        .ok_or(LendingError::NotFound(Entity::Item))?;
    let updated = item.apply(changes);
    uow.items()
        .update(&updated)
        .await
        .map_err(not_found(Entity::Item))?;
    Ok(updated)
}

async fn remove_item_in(uow: &mut dyn UnitOfWork, item_id: ItemId) -> Result<()> {
    ensure_item(uow, item_id).await?;
    if !uow.loans().list_active_by_item(item_id).await?.is_empty() {
        return Err(LendingError::ItemOnLoan);
    }
    uow.items()
        .delete(item_id)
        .await
        .map_err(not_found(Entity::Item))
}

async fn return_in(uow: &mut dyn UnitOfWork, cmd: ReturnItem) -> Result<Outcome<Loan>> {
    let loan = load_loan(uow, cmd.loan_id).await?;
    // 資料を空ける操作は、同じ資料への貸出・予約と資料の行ロックで直列化する
    ensure_item(uow, loan.item_id).await?;
    let (returned, event) = domain::loan::return_item(&loan, cmd.returned_at)?;
    save_loan(uow, &returned).await?;
    Ok(Outcome {
        value: returned,
        events: vec![DomainEvent::ItemReturned(event)],
    })
}

async fn renew_in(
    uow: &mut dyn UnitOfWork,
    cmd: RenewLoan,
    window: Duration,
) -> Result<Outcome<Loan>> {
    let loan = load_loan(uow, cmd.loan_id).await?;
    let (renewed, event) = domain::loan::renew(&loan, cmd.renewed_at, window)?;
    save_loan(uow, &renewed).await?;
    Ok(Outcome {
        value: renewed,
        events: vec![DomainEvent::LoanRenewed(event)],
    })
}

async fn pay_fine_in(uow: &mut dyn UnitOfWork, cmd: PayFine) -> Result<Outcome<Loan>> {
    let loan = load_loan(uow, cmd.loan_id).await?;
    ensure_item(uow, loan.item_id).await?;
    let (settled, event) = domain::loan::pay_fine(&loan, cmd.paid_at)?;
    save_loan(uow, &settled).await?;
    Ok(Outcome {
        value: settled,
        events: vec![DomainEvent::FinePaid(event)],
    })
}

async fn cancel_in(
    uow: &mut dyn UnitOfWork,
    cmd: CancelReservation,
) -> Result<Outcome<Reservation>> {
    let reservation = uow
        .reservations()
        .find_by_id(cmd.reservation_id)
        .await?
        .ok_or(LendingError::NotFound(Entity::Reservation))?;
    let (cancelled, event) = domain::reservation::cancel(&reservation, cmd.cancelled_at)?;
    save_reservation(uow, &cancelled).await?;
    Ok(Outcome {
        value: cancelled,
        events: vec![DomainEvent::ReservationCancelled(event)],
    })
}

async fn availability_in(uow: &mut dyn UnitOfWork, item_id: ItemId) -> Result<Availability> {
    ensure_item(uow, item_id).await?;
    let on_loan = !uow.loans().list_active_by_item(item_id).await?.is_empty();
    let waiting = uow.reservations().list_waiting_by_item(item_id).await?.len();
    Ok(Availability {
        item_id,
        available: !on_loan,
        waiting,
    })
}

async fn member_loans_in(uow: &mut dyn UnitOfWork, member_id: MemberId) -> Result<Vec<Loan>> {
    ensure_member(uow, member_id).await?;
    let mut loans = uow.loans().list_by_member(member_id).await?;
    loans.sort_by_key(|l| (l.borrowed_at, l.loan_id));
    Ok(loans)
}

async fn member_reservations_in(
    uow: &mut dyn UnitOfWork,
    member_id: MemberId,
) -> Result<Vec<Reservation>> {
    ensure_member(uow, member_id).await?;
    let mut reservations = uow.reservations().list_by_member(member_id).await?;
    reservations.sort_by_key(|r| (r.reserved_at, r.reservation_id));
    Ok(reservations)
}

async fn queue_in(uow: &mut dyn UnitOfWork, item_id: ItemId) -> Result<Vec<Reservation>> {
    ensure_item(uow, item_id).await?;
    let waiting = uow.reservations().list_waiting_by_item(item_id).await?;
    Ok(domain::reservation::queue_order(waiting))
}

async fn catalog_in(uow: &mut dyn UnitOfWork, item: Item) -> Result<Item> {
    if uow
        .items()
        .find_by_catalog_number(&item.catalog_number)
        .await?
        .is_some()
    {
        return Err(LendingError::DuplicateCatalogNumber(item.catalog_number));
    }
    uow.items().create(&item).await.map_err(|err| match err {
        StoreError::Constraint { .. } => {
            LendingError::DuplicateCatalogNumber(item.catalog_number.clone())
        }
        other => other.into(),
    })?;
    Ok(item)
}

/// 貸出中（Active）の件数と予約待ちの件数の合計
///
/// `converting`を指定すると、その資料に対する予約待ちは数えない。
async fn held_by(
    uow: &mut dyn UnitOfWork,
    member_id: MemberId,
    converting: Option<ItemId>,
) -> Result<usize> {
    let active = uow
        .loans()
        .list_by_member(member_id)
        .await?
        .iter()
        .filter(|l| l.status == LoanStatus::Active)
        .count();
    let waiting = uow
        .reservations()
        .list_by_member(member_id)
        .await?
        .iter()
        .filter(|r| r.is_waiting() && Some(r.item_id) != converting)
        .count();
    Ok(active + waiting)
}

async fn load_loan(uow: &mut dyn UnitOfWork, loan_id: LoanId) -> Result<Loan> {
    uow.loans()
        .find_by_id(loan_id)
        .await?
        .ok_or(LendingError::NotFound(Entity::Loan))
}

async fn ensure_member(uow: &mut dyn UnitOfWork, member_id: MemberId) -> Result<()> {
    match uow.members().find_by_id(member_id).await? {
        Some(_) => Ok(()),
        None => Err(LendingError::NotFound(Entity::Member)),
    }
}

async fn ensure_item(uow: &mut dyn UnitOfWork, item_id: ItemId) -> Result<()> {
    match uow.items().find_by_id(item_id).await? {
        Some(_) => Ok(()),
        None => Err(LendingError::NotFound(Entity::Item)),
    }
}

async fn save_loan(uow: &mut dyn UnitOfWork, loan: &Loan) -> Result<()> {
    uow.loans()
        .update_status(loan)
        .await
        .map_err(not_found(Entity::Loan))
}

async fn save_reservation(uow: &mut dyn UnitOfWork, reservation: &Reservation) -> Result<()> {
    uow.reservations()
        .update_status(
            reservation.reservation_id,
            reservation.status,
            reservation.closed_at,
        )
        .await
        .map_err(not_found(Entity::Reservation))
}

fn not_found(entity: Entity) -> impl Fn(StoreError) -> LendingError {
    move |err| match err {
        StoreError::NotFound => LendingError::NotFound(entity),
        other => other.into(),
    }
}
