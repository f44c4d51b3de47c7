use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::store::Result;
use crate::domain::{ItemId, MemberId, Reservation, ReservationId, ReservationStatus};

/// 予約リポジトリポート
#[async_trait]
pub trait ReservationRepository: Send {
    /// 予約を作成する
    ///
    /// 同じ利用者・資料の予約待ちが既にある場合は`StoreError::Constraint`。
    async fn create(&mut self, reservation: &Reservation) -> Result<ReservationId>;

    async fn find_by_id(&mut self, reservation_id: ReservationId) -> Result<Option<Reservation>>;

    /// 資料の予約待ちを作成順に返す
    async fn list_waiting_by_item(&mut self, item_id: ItemId) -> Result<Vec<Reservation>>;

    async fn list_by_member(&mut self, member_id: MemberId) -> Result<Vec<Reservation>>;

    /// 予約待ち（Waiting）の予約を`status`へ遷移させ、終了時刻を記録する
    ///
    /// 存在しない場合は`StoreError::NotFound`。読み込んだ後に他の作業単位が
    /// 先に遷移させていた場合（もうWaitingでない）は`StoreError::Contention`。
    async fn update_status(
        &mut self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
