use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ItemId, ItemReserved, LoanId, Member, MemberId, ReservationCancelled,
    ReservationExpired, ReservationFulfilled, ReservationId, ReservationTransitionError,
    ReserveError, check_capacity,
};

/// 予約の状態
///
/// `Waiting`のみが非終端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Waiting,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Waiting => "waiting",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(ReservationStatus::Waiting),
            "fulfilled" => Ok(ReservationStatus::Fulfilled),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

/// Reservation集約 - 貸出中の資料への順番待ち
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub reserved_at: DateTime<Utc>,
    pub status: ReservationStatus,
    /// 取消・期限切れ・貸出変換のいずれかが起きた時刻
    pub closed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_waiting(&self) -> bool {
        self.status == ReservationStatus::Waiting
    }
}

/// 予約作成時に検査する、資料と利用者の現在の状況
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationContext {
    /// 資料がActiveまたはFinedの貸出に占有されているか
    pub item_on_loan: bool,
    /// 利用者がこの資料に予約待ちを持っているか
    pub already_waiting: bool,
    /// 利用者の貸出中＋予約待ちの件数
    pub held: usize,
    pub limit: usize,
}

/// 純粋関数：予約を作成する
///
/// ビジネスルール（検査順）：
/// - 利用者（Member）であること
/// - 貸出中＋予約待ちが上限未満であること
/// - 資料が貸出中であること（空いている資料は予約不要）
/// - 同じ資料に予約待ちを重複して持たないこと
pub fn reserve(
    item_id: ItemId,
    member: &Member,
    reserved_at: DateTime<Utc>,
    context: ReservationContext,
) -> Result<(Reservation, ItemReserved), ReserveError> {
    check_capacity(member, context.held, context.limit)?;

    if !context.item_on_loan {
        return Err(ReserveError::ItemAvailable);
    }
    if context.already_waiting {
        return Err(ReserveError::AlreadyReserved);
    }

    let reservation = Reservation {
        reservation_id: ReservationId::new(),
        item_id,
        member_id: member.member_id,
        reserved_at,
        status: ReservationStatus::Waiting,
        closed_at: None,
    };

    let event = ItemReserved {
        reservation_id: reservation.reservation_id,
        item_id,
        member_id: member.member_id,
        reserved_at,
    };

    Ok((reservation, event))
}

/// 純粋関数：予約を取り消す
pub fn cancel(
    reservation: &Reservation,
    cancelled_at: DateTime<Utc>,
) -> Result<(Reservation, ReservationCancelled), ReservationTransitionError> {
    if !reservation.is_waiting() {
        return Err(ReservationTransitionError::NotWaiting(reservation.status));
    }

    let new_reservation = Reservation {
        status: ReservationStatus::Cancelled,
        closed_at: Some(cancelled_at),
        ..reservation.clone()
    };

    let event = ReservationCancelled {
        reservation_id: reservation.reservation_id,
        cancelled_at,
    };

    Ok((new_reservation, event))
}

/// 純粋関数：先頭の予約を貸出に変換済みにする
pub fn fulfill(
    reservation: &Reservation,
    loan_id: LoanId,
    fulfilled_at: DateTime<Utc>,
) -> Result<(Reservation, ReservationFulfilled), ReservationTransitionError> {
    if !reservation.is_waiting() {
        return Err(ReservationTransitionError::NotWaiting(reservation.status));
    }

    let new_reservation = Reservation {
        status: ReservationStatus::Fulfilled,
        closed_at: Some(fulfilled_at),
        ..reservation.clone()
    };

    let event = ReservationFulfilled {
        reservation_id: reservation.reservation_id,
        loan_id,
        fulfilled_at,
    };

    Ok((new_reservation, event))
}

/// 予約の保持期限
///
/// 資料が空いた時刻（`available_since`）から`validity`の間だけ保持する。
/// 空く前に作られた予約も、空いた時点から数える。
pub fn hold_deadline(
    reservation: &Reservation,
    available_since: DateTime<Utc>,
    validity: Duration,
) -> DateTime<Utc> {
    available_since.max(reservation.reserved_at) + validity
}

/// 純粋関数：期限切れの予約を掃き出す
///
/// `waiting`のうち保持期限を`now`が過ぎたものを`Expired`にした新しい予約と
/// イベントを返す。対象外の予約は返さない。
pub fn expiration_sweep(
    waiting: &[Reservation],
    available_since: DateTime<Utc>,
    validity: Duration,
    now: DateTime<Utc>,
) -> Vec<(Reservation, ReservationExpired)> {
    waiting
        .iter()
        .filter(|r| r.is_waiting())
        .filter(|r| now > hold_deadline(r, available_since, validity))
        .map(|r| {
            let expired = Reservation {
                status: ReservationStatus::Expired,
                closed_at: Some(now),
                ..r.clone()
            };
            let event = ReservationExpired {
                reservation_id: r.reservation_id,
                member_id: r.member_id,
                expired_at: now,
            };
            (expired, event)
        })
        .collect()
}

/// 純粋関数：待ち行列の先頭を返す
///
/// `Waiting`のうち作成時刻が最も早いもの。同時刻は予約IDで決める。
pub fn head_of(waiting: &[Reservation]) -> Option<&Reservation> {
    waiting
        .iter()
        .filter(|r| r.is_waiting())
        .min_by_key(|r| (r.reserved_at, r.reservation_id))
}

/// 待ち行列を先頭から順に並べる
pub fn queue_order(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.retain(Reservation::is_waiting);
    reservations.sort_by_key(|r| (r.reserved_at, r.reservation_id));
    reservations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EligibilityError, Role};
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()
    }

    fn member() -> Member {
        Member::register("Maria", "maria@example.com", Role::Member, t(1))
    }

    fn on_loan() -> ReservationContext {
        ReservationContext {
            item_on_loan: true,
            already_waiting: false,
            held: 0,
            limit: 3,
        }
    }

    fn waiting(item_id: ItemId, at: DateTime<Utc>) -> Reservation {
        reserve(item_id, &member(), at, on_loan()).unwrap().0
    }

    #[test]
    fn test_reserve_creates_waiting_reservation() {
        let item_id = ItemId::new();
        let m = member();

        let (reservation, event) = reserve(item_id, &m, t(2), on_loan()).unwrap();

        assert_eq!(reservation.status, ReservationStatus::Waiting);
        assert_eq!(reservation.member_id, m.member_id);
        assert_eq!(event.reservation_id, reservation.reservation_id);
        assert_eq!(event.reserved_at, t(2));
    }

    #[test]
    fn test_reserve_available_item_fails() {
        let context = ReservationContext {
            item_on_loan: false,
            ..on_loan()
        };
        assert_eq!(
            reserve(ItemId::new(), &member(), t(2), context).unwrap_err(),
            ReserveError::ItemAvailable
        );
    }

    #[test]
    fn test_reserve_duplicate_fails() {
        let context = ReservationContext {
            already_waiting: true,
            ..on_loan()
        };
        assert_eq!(
            reserve(ItemId::new(), &member(), t(2), context).unwrap_err(),
            ReserveError::AlreadyReserved
        );
    }

    #[test]
    fn test_reserve_by_staff_fails() {
        let staff = Member::register("Admin", "admin@example.com", Role::Administrator, t(1));
        let err = reserve(ItemId::new(), &staff, t(2), on_loan()).unwrap_err();
        assert_eq!(err.eligibility(), Some(&EligibilityError::NotEligible));
    }

    #[test]
    fn test_reserve_at_limit_fails() {
        let context = ReservationContext {
            held: 3,
            ..on_loan()
        };
        assert_eq!(
            reserve(ItemId::new(), &member(), t(2), context).unwrap_err(),
            ReserveError::Eligibility(EligibilityError::LimitExceeded { limit: 3 })
        );
    }

    #[test]
    fn test_cancel_waiting_reservation() {
        let reservation = waiting(ItemId::new(), t(2));

        let (cancelled, event) = cancel(&reservation, t(3)).unwrap();

        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(cancelled.closed_at, Some(t(3)));
        assert_eq!(event.cancelled_at, t(3));
    }

    #[test]
    fn test_cancel_twice_fails() {
        let reservation = waiting(ItemId::new(), t(2));
        let (cancelled, _) = cancel(&reservation, t(3)).unwrap();

        assert_eq!(
            cancel(&cancelled, t(4)).unwrap_err(),
            ReservationTransitionError::NotWaiting(ReservationStatus::Cancelled)
        );
    }

    #[test]
    fn test_fulfill_records_loan() {
        let reservation = waiting(ItemId::new(), t(2));
        let loan_id = LoanId::new();

        let (fulfilled, event) = fulfill(&reservation, loan_id, t(5)).unwrap();

        assert_eq!(fulfilled.status, ReservationStatus::Fulfilled);
        assert_eq!(event.loan_id, loan_id);
    }

    #[test]
    fn test_sweep_expires_only_stale_reservations() {
        let item_id = ItemId::new();
        let first = waiting(item_id, t(2));
        let second = waiting(item_id, t(3));
        let available_since = t(10);
        let validity = Duration::days(3);

        let batch = [first.clone(), second.clone()];
        assert!(expiration_sweep(&batch, available_since, validity, t(13)).is_empty());

        let swept = expiration_sweep(&batch, available_since, validity, t(14));
        assert_eq!(swept.len(), 2);
        assert!(swept.iter().all(|(r, _)| r.status == ReservationStatus::Expired));
        assert_eq!(swept[0].1.reservation_id, first.reservation_id);
        assert_eq!(swept[0].0.closed_at, Some(t(14)));
    }

    #[test]
    fn test_sweep_ignores_terminal_reservations() {
        let reservation = waiting(ItemId::new(), t(2));
        let (cancelled, _) = cancel(&reservation, t(3)).unwrap();

        assert!(expiration_sweep(&[cancelled], t(4), Duration::days(1), t(20)).is_empty());
    }

    #[test]
    fn test_head_of_is_earliest_waiting() {
        let item_id = ItemId::new();
        let first = waiting(item_id, t(2));
        let second = waiting(item_id, t(3));
        let (cancelled_first, _) = cancel(&first, t(4)).unwrap();

        assert_eq!(
            head_of(&[second.clone(), first.clone()]).map(|r| r.reservation_id),
            Some(first.reservation_id)
        );
        assert_eq!(
            head_of(&[cancelled_first, second.clone()]).map(|r| r.reservation_id),
            Some(second.reservation_id)
        );
        assert!(head_of(&[]).is_none());
    }

    #[test]
    fn test_head_of_breaks_ties_by_id() {
        let item_id = ItemId::new();
        let a = waiting(item_id, t(2));
        let b = waiting(item_id, t(2));
        let expected = a.reservation_id.min(b.reservation_id);

        assert_eq!(head_of(&[a, b]).map(|r| r.reservation_id), Some(expected));
    }

    #[test]
    fn test_queue_order_sorts_waiting() {
        let item_id = ItemId::new();
        let late = waiting(item_id, t(4));
        let early = waiting(item_id, t(2));

        let ordered = queue_order(vec![late.clone(), early.clone()]);

        assert_eq!(
            ordered.iter().map(|r| r.reservation_id).collect::<Vec<_>>(),
            vec![early.reservation_id, late.reservation_id]
        );
    }
}
