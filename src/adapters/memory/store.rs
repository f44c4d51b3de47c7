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
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct State {
    members: HashMap<MemberId, Member>,
    items: HashMap<ItemId, Item>,
    loans: HashMap<LoanId, Loan>,
    reservations: HashMap<ReservationId, Reservation>,
}

/// In-memory implementation of `Store`
///
/// A unit of work holds the store-wide lock from `begin` until it is committed
/// or dropped, so transactions run one at a time. Writes go to a private copy
/// of the state that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    contention: Arc<AtomicU32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commits` commits fail with `StoreError::Contention`
    ///
    /// Used by tests to exercise the retry path.
    pub fn inject_contention(&self, commits: u32) {
        self.contention.store(commits, Ordering::SeqCst);
    }

    fn take_contention(&self) -> bool {
        self.contention
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            store: self.clone(),
            guard,
            working,
        }))
    }
}

struct InMemoryUnitOfWork {
    store: InMemoryStore,
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
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
        if self.store.take_contention() {
            return Err(StoreError::Contention(
                "injected serialization failure".to_string(),
            ));
        }
        let InMemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

fn constraint(name: &str) -> StoreError {
    StoreError::Constraint {
        constraint: name.to_string(),
    }
}

#[async_trait]
impl MemberRepository for InMemoryUnitOfWork {
    async fn create(&mut self, member: &Member) -> Result<MemberId> {
        if self.working.members.contains_key(&member.member_id) {
            return Err(constraint("members_pkey"));
        }
        self.working
            .members
            .insert(member.member_id, member.clone());
        Ok(member.member_id)
    }

    async fn find_by_id(&mut self, member_id: MemberId) -> Result<Option<Member>> {
        Ok(self.working.members.get(&member_id).cloned())
    }

    async fn delete(&mut self, member_id: MemberId) -> Result<()> {
        if self.working.members.remove(&member_id).is_none() {
            return Err(StoreError::NotFound);
        }
        self.working.loans.retain(|_, l| l.member_id != member_id);
        self.working
            .reservations
            .retain(|_, r| r.member_id != member_id);
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for InMemoryUnitOfWork {
    async fn create(&mut self, item: &Item) -> Result<ItemId> {
        if self.working.items.contains_key(&item.item_id) {
            return Err(constraint("items_pkey"));
        }
        if self
            .working
            .items
            .values()
            .any(|i| i.catalog_number == item.catalog_number)
        {
            return Err(constraint("items_catalog_number_key"));
        }
        self.working.items.insert(item.item_id, item.clone());
        Ok(item.item_id)
    }

    async fn find_by_id(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.working.items.get(&item_id).cloned())
    }

    async fn find_by_catalog_number(&mut self, catalog_number: &str) -> Result<Option<Item>> {
        Ok(self
            .working
            .items
            .values()
            .find(|i| i.catalog_number == catalog_number)
            .cloned())
    }

    async fn update(&mut self, item: &Item) -> Result<()> {
        match self.working.items.get_mut(&item.item_id) {
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&mut self, item_id: ItemId) -> Result<()> {
        if self.working.items.remove(&item_id).is_none() {
            return Err(StoreError::NotFound);
        }
        self.working.loans.retain(|_, l| l.item_id != item_id);
        self.working.reservations.retain(|_, r| r.item_id != item_id);
        Ok(())
    }
}

#[async_trait]
impl LoanRepository for InMemoryUnitOfWork {
    async fn create(&mut self, loan: &Loan) -> Result<LoanId> {
        if self.working.loans.contains_key(&loan.loan_id) {
            return Err(constraint("loans_pkey"));
        }
        if self
            .working
            .loans
            .values()
            .any(|l| l.item_id == loan.item_id && l.status.holds_item())
        {
            return Err(constraint("loans_one_open_per_item"));
        }
        self.working.loans.insert(loan.loan_id, loan.clone());
        Ok(loan.loan_id)
    }

    async fn find_by_id(&mut self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.working.loans.get(&loan_id).cloned())
    }

    async fn list_active_by_item(&mut self, item_id: ItemId) -> Result<Vec<Loan>> {
        Ok(self
            .working
            .loans
            .values()
            .filter(|l| l.item_id == item_id && l.status.holds_item())
            .cloned()
            .collect())
    }

    async fn list_by_item(&mut self, item_id: ItemId) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .working
            .loans
            .values()
            .filter(|l| l.item_id == item_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| (l.borrowed_at, l.loan_id));
        Ok(loans)
    }

    async fn list_by_member(&mut self, member_id: MemberId) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .working
            .loans
            .values()
            .filter(|l| l.member_id == member_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| (l.borrowed_at, l.loan_id));
        Ok(loans)
    }

    async fn update_status(&mut self, loan: &Loan) -> Result<()> {
        match self.working.loans.get_mut(&loan.loan_id) {
            Some(stored) => {
                *stored = loan.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl ReservationRepository for InMemoryUnitOfWork {
    async fn create(&mut self, reservation: &Reservation) -> Result<ReservationId> {
        if self
            .working
            .reservations
            .contains_key(&reservation.reservation_id)
        {
            return Err(constraint("reservations_pkey"));
        }
        if self.working.reservations.values().any(|r| {
            r.is_waiting()
                && r.member_id == reservation.member_id
                && r.item_id == reservation.item_id
        }) {
            return Err(constraint("reservations_one_waiting_per_member_item"));
        }
        self.working
            .reservations
            .insert(reservation.reservation_id, reservation.clone());
        Ok(reservation.reservation_id)
    }

    async fn find_by_id(&mut self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.working.reservations.get(&reservation_id).cloned())
    }

    async fn list_waiting_by_item(&mut self, item_id: ItemId) -> Result<Vec<Reservation>> {
        let mut waiting: Vec<Reservation> = self
            .working
            .reservations
            .values()
            .filter(|r| r.item_id == item_id && r.is_waiting())
            .cloned()
            .collect();
        waiting.sort_by_key(|r| (r.reserved_at, r.reservation_id));
        Ok(waiting)
    }

    async fn list_by_member(&mut self, member_id: MemberId) -> Result<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .working
            .reservations
            .values()
            .filter(|r| r.member_id == member_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| (r.reserved_at, r.reservation_id));
        Ok(reservations)
    }

    async fn update_status(
        &mut self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match self.working.reservations.get_mut(&reservation_id) {
            Some(stored) if stored.status != ReservationStatus::Waiting => {
                Err(StoreError::Contention(format!(
                    "reservation {} is no longer waiting ({})",
                    reservation_id,
                    stored.status.as_str()
                )))
            }
            Some(stored) => {
                stored.status = status;
                stored.closed_at = closed_at;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}
