use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EligibilityError, MemberId};

/// 利用者の種別
///
/// 貸出・予約ができるのは`Member`のみ。職員アカウントは同じ台帳に載るが資格を持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Librarian,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Librarian => "librarian",
            Role::Administrator => "administrator",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "librarian" => Ok(Role::Librarian),
            "administrator" => Ok(Role::Administrator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// 利用者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub registered_at: DateTime<Utc>,
}

impl Member {
    pub fn register(
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            member_id: MemberId::new(),
            name: name.into(),
            email: email.into(),
            role,
            registered_at,
        }
    }

    /// 貸出・予約を保持できるか
    pub fn may_hold_loans(&self) -> bool {
        self.role == Role::Member
    }
}

/// 純粋関数：新たに貸出または予約を1件持てるか判定する
///
/// `held`は貸出中の件数と予約待ちの件数の合計。
pub fn check_capacity(member: &Member, held: usize, limit: usize) -> Result<(), EligibilityError> {
    if !member.may_hold_loans() {
        return Err(EligibilityError::NotEligible);
    }
    if held >= limit {
        return Err(EligibilityError::LimitExceeded { limit });
    }
    Ok(())
}
