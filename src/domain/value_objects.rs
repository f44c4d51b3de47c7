use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UUIDを包む識別子型を定義する
///
/// 各集約のIDは互いに取り違えられないよう別の型にする。
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn value(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// 貸出ID - 1回の貸出エピソード
    LoanId
);
uuid_id!(
    /// 資料ID - カタログ上の1点（紙または電子）
    ItemId
);
uuid_id!(
    /// 利用者ID
    MemberId
);
uuid_id!(
    /// 予約ID
    ReservationId
);

/// 更新回数エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalCountError {
    /// 更新回数の上限に達した
    LimitReached { limit: u8 },
}

/// 更新回数
///
/// 上限は貸出ごとに凍結された条件（`LoanTerms::renewal_limit`）で決まるため、
/// 値そのものは上限を持たず、`increment` で上限を渡して検査する。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenewalCount(u8);

impl RenewalCount {
    /// 新規作成（0回）
    pub fn new() -> Self {
        Self(0)
    }

    /// 更新回数を1増やす
    ///
    /// # エラー
    /// 既に`limit`回更新済みの場合は`RenewalCountError::LimitReached`
    pub fn increment(self, limit: u8) -> Result<Self, RenewalCountError> {
        if !self.can_renew(limit) {
            return Err(RenewalCountError::LimitReached { limit });
        }
        Ok(Self(self.0 + 1))
    }

    pub fn can_renew(&self, limit: u8) -> bool {
        self.0 < limit
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for RenewalCount {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// 金額エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    Negative(Decimal),
    /// 小数点以下が2桁を超える
    TooPrecise(Decimal),
}

/// 金額（非負、通貨単位は運用側で固定）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);

    /// 小数点以下の最大桁数（永続化層の`NUMERIC(12, 2)`と一致させる）
    pub const SCALE: u32 = 2;

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        if amount.normalize().scale() > Self::SCALE {
            return Err(MoneyError::TooPrecise(amount));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// 単価 × 数量
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneyError::Negative(amount) => write!(f, "amount must not be negative: {amount}"),
            MoneyError::TooPrecise(amount) => {
                write!(f, "amount has more than {} decimal places: {amount}", Money::SCALE)
            }
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
