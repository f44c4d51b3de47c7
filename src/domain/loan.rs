use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Fine, FinePaid, ItemBorrowed, ItemId, ItemReturned, LoanId, LoanRenewed, LoanTerms,
    LoanTransitionError, MemberId, RenewalCount, RenewalError, compute_fine, overdue_days,
};

/// 貸出の状態
///
/// `Active` → `Fined` | `Closed`、`Fined` → `Closed`（支払いのみ）。`Closed`は終端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// 貸出中
    Active,
    /// 延滞返却済み・延滞料未払い
    Fined,
    /// 完了
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Fined => "fined",
            LoanStatus::Closed => "closed",
        }
    }

    /// 資料を占有している状態か（Active または Fined）
    pub fn holds_item(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Fined)
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "fined" => Ok(LoanStatus::Fined),
            "closed" => Ok(LoanStatus::Closed),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Loan集約 - 1点の資料の1回の貸出
///
/// 返却期限は保存しない。`due_date()`で開始時刻・更新回数・凍結された
/// 貸出期間から毎回導出する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    // 識別子
    pub loan_id: LoanId,

    // 他の集約への参照（IDのみ）
    pub item_id: ItemId,
    pub member_id: MemberId,

    // 貸出管理の責務
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub renewal_count: RenewalCount,
    pub status: LoanStatus,
    pub fine: Option<Fine>,
    pub terms: LoanTerms,
}

impl Loan {
    /// 返却期限 = 開始 + (更新回数 + 1) × 貸出期間
    ///
    /// 表現可能な範囲を超える場合は`DateTime::<Utc>::MAX_UTC`で頭打ちにする。
    pub fn due_date(&self) -> DateTime<Utc> {
        let periods = i32::from(self.renewal_count.value()) + 1;
        self.terms
            .loan_period()
            .checked_mul(periods)
            .and_then(|span| self.borrowed_at.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 資料が再び貸出可能になった時刻
    ///
    /// 期限内返却なら返却時刻、延滞料の支払いで完了したなら支払い時刻。
    /// 完了していなければ`None`。
    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            LoanStatus::Closed => self.settled_at.or(self.returned_at),
            LoanStatus::Active | LoanStatus::Fined => None,
        }
    }

    /// 未払いの延滞料
    pub fn outstanding_fine(&self) -> Option<Fine> {
        self.fine.filter(|fine| !fine.paid)
    }
}

/// 純粋関数：資料を貸し出す
///
/// ビジネスルール：
/// - 状態はActive、更新回数は0
/// - 貸出条件は作成時点の方針で凍結する
///
/// 利用資格・上限・予約順の検査は呼び出し側（貸出エンジン）の責務。
pub fn borrow(
    item_id: ItemId,
    member_id: MemberId,
    borrowed_at: DateTime<Utc>,
    terms: LoanTerms,
) -> (Loan, ItemBorrowed) {
    let loan = Loan {
        loan_id: LoanId::new(),
        item_id,
        member_id,
        borrowed_at,
        returned_at: None,
        settled_at: None,
        renewal_count: RenewalCount::new(),
        status: LoanStatus::Active,
        fine: None,
        terms,
    };

    let event = ItemBorrowed {
        loan_id: loan.loan_id,
        item_id,
        member_id,
        borrowed_at,
        due_date: loan.due_date(),
    };

    (loan, event)
}

/// 純粋関数：資料を返却する
///
/// ビジネスルール：
/// - Active以外は返却不可
/// - 期限を過ぎていれば延滞日数（切り上げ）× 日額の延滞料を付けてFinedへ
/// - 期限内ならClosedへ
pub fn return_item(
    loan: &Loan,
    returned_at: DateTime<Utc>,
) -> Result<(Loan, ItemReturned), LoanTransitionError> {
    if loan.status != LoanStatus::Active {
        return Err(LoanTransitionError::NotActive(loan.status));
    }

    let fine = overdue_days(returned_at - loan.due_date())
        .map(|days| Fine::unpaid(compute_fine(days, loan.terms.daily_fine)));

    let status = if fine.is_some() {
        LoanStatus::Fined
    } else {
        LoanStatus::Closed
    };

    let new_loan = Loan {
        returned_at: Some(returned_at),
        status,
        fine,
        ..loan.clone()
    };

    let event = ItemReturned {
        loan_id: loan.loan_id,
        item_id: loan.item_id,
        member_id: loan.member_id,
        returned_at,
        status,
        fine,
    };

    Ok((new_loan, event))
}

/// 純粋関数：貸出を更新する
///
/// ビジネスルール：
/// - Active以外は更新不可
/// - 更新回数は凍結された上限まで
/// - 返却期限の`window`前から期限までの間のみ受け付ける
/// - 期限を過ぎた貸出は返却が必要
pub fn renew(
    loan: &Loan,
    renewed_at: DateTime<Utc>,
    window: Duration,
) -> Result<(Loan, LoanRenewed), RenewalError> {
    if loan.status != LoanStatus::Active {
        return Err(RenewalError::NotActive(loan.status));
    }

    let new_count = loan.renewal_count.increment(loan.terms.renewal_limit)?;

    let old_due_date = loan.due_date();
    let opens_at = old_due_date - window;
    if renewed_at < opens_at {
        return Err(RenewalError::TooEarly { opens_at });
    }
    if renewed_at > old_due_date {
        return Err(RenewalError::Overdue {
            due_date: old_due_date,
        });
    }

    let new_loan = Loan {
        renewal_count: new_count,
        ..loan.clone()
    };

    let event = LoanRenewed {
        loan_id: loan.loan_id,
        old_due_date,
        new_due_date: new_loan.due_date(),
        renewed_at,
        renewal_count: new_count.value(),
    };

    Ok((new_loan, event))
}

/// 純粋関数：延滞料を支払う
///
/// ビジネスルール：
/// - Fined以外は支払い対象なし
/// - 支払い後はClosed、支払い時刻を記録
pub fn pay_fine(
    loan: &Loan,
    settled_at: DateTime<Utc>,
) -> Result<(Loan, FinePaid), LoanTransitionError> {
    let fine = match (loan.status, loan.outstanding_fine()) {
        (LoanStatus::Fined, Some(fine)) => fine.settle(),
        (status, _) => return Err(LoanTransitionError::NoOutstandingFine(status)),
    };

    let new_loan = Loan {
        status: LoanStatus::Closed,
        settled_at: Some(settled_at),
        fine: Some(fine),
        ..loan.clone()
    };

    let event = FinePaid {
        loan_id: loan.loan_id,
        member_id: loan.member_id,
        fine,
        settled_at,
    };

    Ok((new_loan, event))
}

/// 純粋関数：延滞判定
pub fn is_overdue(loan: &Loan, now: DateTime<Utc>) -> bool {
    loan.status == LoanStatus::Active && now > loan.due_date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Money;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn terms() -> LoanTerms {
        LoanTerms {
            loan_period_days: 14,
            renewal_limit: 2,
            daily_fine: Money::new(dec!(2.00)).unwrap(),
        }
    }

    fn new_loan() -> Loan {
        borrow(ItemId::new(), MemberId::new(), start(), terms()).0
    }

    #[test]
    fn test_borrow_creates_active_loan() {
        let item_id = ItemId::new();
        let member_id = MemberId::new();

        let (loan, event) = borrow(item_id, member_id, start(), terms());

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.renewal_count.value(), 0);
        assert!(loan.fine.is_none());
        assert_eq!(loan.due_date(), start() + Duration::days(14));

        assert_eq!(event.loan_id, loan.loan_id);
        assert_eq!(event.item_id, item_id);
        assert_eq!(event.member_id, member_id);
        assert_eq!(event.due_date, loan.due_date());
    }

    #[test]
    fn test_due_date_uses_frozen_terms() {
        let mut loan = new_loan();
        loan.terms.loan_period_days = 7;
        loan.renewal_count = RenewalCount::from(2);
        assert_eq!(loan.due_date(), start() + Duration::days(21));
    }

    #[test]
    fn test_return_on_time_closes_loan() {
        let loan = new_loan();
        let returned_at = start() + Duration::days(14);

        let (returned, event) = return_item(&loan, returned_at).unwrap();

        assert_eq!(returned.status, LoanStatus::Closed);
        assert_eq!(returned.returned_at, Some(returned_at));
        assert!(returned.fine.is_none());
        assert_eq!(returned.released_at(), Some(returned_at));
        assert_eq!(event.status, LoanStatus::Closed);
        assert!(event.fine.is_none());
    }

    #[test]
    fn test_return_late_creates_unpaid_fine() {
        let loan = new_loan();
        let returned_at = start() + Duration::days(19);

        let (returned, event) = return_item(&loan, returned_at).unwrap();

        assert_eq!(returned.status, LoanStatus::Fined);
        let fine = returned.fine.unwrap();
        assert_eq!(fine.amount.amount(), dec!(10.00));
        assert!(!fine.paid);
        assert_eq!(returned.released_at(), None);
        assert_eq!(event.fine, Some(fine));
    }

    #[test]
    fn test_return_partial_day_late_rounds_up() {
        let loan = new_loan();
        let returned_at = start() + Duration::days(14) + Duration::hours(3);

        let (returned, _) = return_item(&loan, returned_at).unwrap();

        assert_eq!(returned.fine.unwrap().amount.amount(), dec!(2.00));
    }

    #[test]
    fn test_return_twice_fails() {
        let loan = new_loan();
        let (returned, _) = return_item(&loan, start() + Duration::days(1)).unwrap();

        let result = return_item(&returned, start() + Duration::days(2));
        assert_eq!(
            result.unwrap_err(),
            LoanTransitionError::NotActive(LoanStatus::Closed)
        );
    }

    #[test]
    fn test_renew_inside_window_extends_due_date() {
        let loan = new_loan();
        let renewed_at = start() + Duration::days(13);

        let (renewed, event) = renew(&loan, renewed_at, Duration::days(2)).unwrap();

        assert_eq!(renewed.renewal_count.value(), 1);
        assert_eq!(renewed.due_date(), start() + Duration::days(28));
        assert_eq!(event.old_due_date, loan.due_date());
        assert_eq!(event.new_due_date, renewed.due_date());
        assert_eq!(event.renewal_count, 1);
    }

    #[test]
    fn test_renew_too_early_fails() {
        let loan = new_loan();

        let result = renew(&loan, start() + Duration::days(1), Duration::days(2));

        assert_eq!(
            result.unwrap_err(),
            RenewalError::TooEarly {
                opens_at: start() + Duration::days(12)
            }
        );
    }

    #[test]
    fn test_renew_after_due_date_fails() {
        let loan = new_loan();

        let result = renew(
            &loan,
            start() + Duration::days(14) + Duration::seconds(1),
            Duration::days(2),
        );

        assert_eq!(
            result.unwrap_err(),
            RenewalError::Overdue {
                due_date: start() + Duration::days(14)
            }
        );
    }

    #[test]
    fn test_renew_stops_at_limit() {
        let loan = new_loan();
        let window = Duration::days(2);

        let (loan, _) = renew(&loan, start() + Duration::days(13), window).unwrap();
        let (loan, _) = renew(&loan, start() + Duration::days(27), window).unwrap();
        let result = renew(&loan, start() + Duration::days(41), window);

        assert_eq!(result.unwrap_err(), RenewalError::LimitReached { limit: 2 });
    }

    #[test]
    fn test_renew_closed_loan_fails() {
        let loan = new_loan();
        let (closed, _) = return_item(&loan, start() + Duration::days(1)).unwrap();

        let result = renew(&closed, start() + Duration::days(13), Duration::days(2));

        assert_eq!(
            result.unwrap_err(),
            RenewalError::NotActive(LoanStatus::Closed)
        );
    }

    #[test]
    fn test_pay_fine_closes_loan() {
        let loan = new_loan();
        let (fined, _) = return_item(&loan, start() + Duration::days(20)).unwrap();
        let settled_at = start() + Duration::days(21);

        let (closed, event) = pay_fine(&fined, settled_at).unwrap();

        assert_eq!(closed.status, LoanStatus::Closed);
        assert_eq!(closed.settled_at, Some(settled_at));
        assert!(closed.fine.unwrap().paid);
        assert_eq!(closed.released_at(), Some(settled_at));
        assert!(closed.outstanding_fine().is_none());
        assert_eq!(event.fine.amount.amount(), dec!(12.00));
    }

    #[test]
    fn test_pay_fine_without_fine_fails() {
        let loan = new_loan();

        assert_eq!(
            pay_fine(&loan, start()).unwrap_err(),
            LoanTransitionError::NoOutstandingFine(LoanStatus::Active)
        );

        let (closed, _) = return_item(&loan, start() + Duration::days(1)).unwrap();
        assert_eq!(
            pay_fine(&closed, start()).unwrap_err(),
            LoanTransitionError::NoOutstandingFine(LoanStatus::Closed)
        );
    }

    #[test]
    fn test_is_overdue() {
        let loan = new_loan();
        assert!(!is_overdue(&loan, start() + Duration::days(14)));
        assert!(is_overdue(&loan, start() + Duration::days(15)));

        let (closed, _) = return_item(&loan, start() + Duration::days(1)).unwrap();
        assert!(!is_overdue(&closed, start() + Duration::days(30)));
    }

    #[test]
    fn test_due_date_saturates_instead_of_overflowing() {
        let mut loan = new_loan();
        loan.terms.loan_period_days = u32::MAX;
        loan.renewal_count = RenewalCount::from(2);

        assert_eq!(loan.due_date(), DateTime::<Utc>::MAX_UTC);
        assert!(!is_overdue(&loan, start() + Duration::days(10_000)));
    }

    #[test]
    fn test_loan_status_parse() {
        assert_eq!("fined".parse::<LoanStatus>(), Ok(LoanStatus::Fined));
        assert!("overdue".parse::<LoanStatus>().is_err());
        assert!(LoanStatus::Fined.holds_item());
        assert!(!LoanStatus::Closed.holds_item());
    }
}
