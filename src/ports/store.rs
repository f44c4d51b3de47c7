use async_trait::async_trait;
use thiserror::Error;

use super::{ItemRepository, LoanRepository, MemberRepository, ReservationRepository};

/// ストアのエラー
///
/// 貸出エンジンはこの区別（未検出・制約違反・一時的な競合・その他）に基づいて
/// 自分のエラーへ写像する。同一視してはならない。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 対象レコードが存在しない
    #[error("record not found")]
    NotFound,

    /// 一意制約などの違反（制約名つき）
    #[error("constraint violated: {constraint}")]
    Constraint { constraint: String },

    /// ロック競合・直列化失敗など、再試行で解消しうる失敗
    #[error("transient contention: {0}")]
    Contention(String),

    /// それ以外のバックエンド障害
    #[error("store backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Contention(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// トランザクションを開始するストア
///
/// 貸出エンジンの1操作は1つの`UnitOfWork`の中で「読む・検査する・書く」を行う。
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// 1トランザクション分の作業単位
///
/// 各リポジトリは同じトランザクションを共有する。`commit`せずに破棄すると
/// すべての変更が取り消される。
#[async_trait]
pub trait UnitOfWork: Send {
    fn members(&mut self) -> &mut dyn MemberRepository;
    fn items(&mut self) -> &mut dyn ItemRepository;
    fn loans(&mut self) -> &mut dyn LoanRepository;
    fn reservations(&mut self) -> &mut dyn ReservationRepository;

    async fn commit(self: Box<Self>) -> Result<()>;
}
