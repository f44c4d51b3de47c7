use async_trait::async_trait;

use super::store::Result;
use crate::domain::{ItemId, Loan, LoanId, MemberId};

/// 貸出リポジトリポート
///
/// 延滞料は貸出に属するため、貸出と一緒に保存・取得する。
/// 貸出は削除しない（監査記録）。
#[async_trait]
pub trait LoanRepository: Send {
    async fn create(&mut self, loan: &Loan) -> Result<LoanId>;

    /// 貸出を取得し、作業単位の終わりまでロックする
    async fn find_by_id(&mut self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 資料を占有している貸出（Active または Fined）
    async fn list_active_by_item(&mut self, item_id: ItemId) -> Result<Vec<Loan>>;

    /// 資料の全貸出履歴
    async fn list_by_item(&mut self, item_id: ItemId) -> Result<Vec<Loan>>;

    async fn list_by_member(&mut self, member_id: MemberId) -> Result<Vec<Loan>>;

    /// 状態・返却時刻・支払い時刻・更新回数・延滞料を保存する
    ///
    /// 存在しない場合は`StoreError::NotFound`。
    async fn update_status(&mut self, loan: &Loan) -> Result<()>;
}
