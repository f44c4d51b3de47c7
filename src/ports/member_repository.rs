use async_trait::async_trait;

use super::store::Result;
use crate::domain::{Member, MemberId};

/// 利用者リポジトリポート
#[async_trait]
pub trait MemberRepository: Send {
    async fn create(&mut self, member: &Member) -> Result<MemberId>;

    /// 利用者を取得する
    ///
    /// 作業単位の終わりまで、同じ利用者に対する他の書き込みを待たせる。
    /// 利用者ごとの上限検査を直列化するため。
    async fn find_by_id(&mut self, member_id: MemberId) -> Result<Option<Member>>;

    /// 削除する。依存する貸出・予約の扱いは永続化層の責務。
    async fn delete(&mut self, member_id: MemberId) -> Result<()>;
}
