use crate::application::lending::LendingEngine;
use crate::domain::{
    CancelReservation, ItemId, LoanId, MemberId, PayFine, RenewLoan, ReservationId, ReturnItem,
};
use crate::ports::Clock;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    types::{
        AvailabilityResponse, BorrowItemRequest, CatalogItemRequest, FineResponse, ItemResponse,
        LoanResponse, MemberResponse, OutcomeResponse, RegisterMemberRequest,
        ReservationResponse, ReserveItemRequest, UpdateItemRequest,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
///
/// 操作時刻はリクエスト受付時に`clock`から取り、コマンドに入れて渡す。
#[derive(Clone)]
pub struct AppState {
    pub engine: LendingEngine,
    pub clock: Arc<dyn Clock>,
}

// ============================================================================
// Members
// ============================================================================

/// POST /members - 利用者を登録
pub async fn register_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let member = state
        .engine
        .register_member(req.name, req.email, req.role, state.clock.now())
        .await?;

    Ok((StatusCode::CREATED, Json(member.into())))
}

/// DELETE /members/:id - 利用者を削除
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .remove_member(MemberId::from_uuid(member_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /members/:id/loans - 利用者の貸出履歴
pub async fn member_loans(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let loans = state
        .engine
        .member_loans(MemberId::from_uuid(member_id))
        .await?;
    Ok(Json(loans.into_iter().map(LoanResponse::from).collect()))
}

/// GET /members/:id/reservations - 利用者の予約
pub async fn member_reservations(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let reservations = state
        .engine
        .member_reservations(MemberId::from_uuid(member_id))
        .await?;
    Ok(Json(
        reservations
            .into_iter()
            .map(ReservationResponse::from)
            .collect(),
    ))
}

/// GET /members/:id/fines - 未払いの延滞料
pub async fn outstanding_fines(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let loans = state
        .engine
        .outstanding_fines(MemberId::from_uuid(member_id))
        .await?;
    Ok(Json(loans.into_iter().map(LoanResponse::from).collect()))
}

// ============================================================================
// Items
// ============================================================================

/// POST /items - 資料を目録に登録
///
/// `url`を指定すると電子資料になる。
pub async fn catalog_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CatalogItemRequest>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let item = state
        .engine
        .catalog_item(req.into_new_item(), state.clock.now())
        .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// PATCH /items/:id - 書名・著者・分類を変更
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item = state
        .engine
        .update_item(ItemId::from_uuid(item_id), req)
        .await?;
    Ok(Json(item.into()))
}

/// DELETE /items/:id - 資料を削除（貸出中は不可）
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.remove_item(ItemId::from_uuid(item_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /items/:id/availability - 貸出可否
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let availability = state
        .engine
        .availability(ItemId::from_uuid(item_id))
        .await?;
    Ok(Json(availability.into()))
}

/// GET /items/:id/queue - 予約待ち（先頭から順）
pub async fn reservation_queue(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let queue = state
        .engine
        .reservation_queue(ItemId::from_uuid(item_id))
        .await?;
    Ok(Json(queue.into_iter().map(ReservationResponse::from).collect()))
}

// ============================================================================
// Loans
// ============================================================================

/// POST /loans - 資料を貸し出す
///
/// 強制されるビジネスルール:
/// - 利用者（Member）であること
/// - 貸出中＋予約待ちが上限未満であること
/// - 資料が貸出中でないこと
/// - 予約待ちがあれば、その先頭の利用者であること
pub async fn borrow_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BorrowItemRequest>,
) -> Result<(StatusCode, Json<OutcomeResponse<LoanResponse>>), ApiError> {
    let outcome = state
        .engine
        .borrow_item(req.to_command(state.clock.now()))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// GET /loans/:id - 貸出詳細（返却期限を含む）
pub async fn get_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = state.engine.loan(LoanId::from_uuid(loan_id)).await?;
    Ok(Json(loan.into()))
}

/// POST /loans/:id/return - 返却
///
/// 延滞していれば延滞料が課され、支払いまで貸出は完了しない。
pub async fn return_item(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<OutcomeResponse<LoanResponse>>, ApiError> {
    let cmd = ReturnItem {
        loan_id: LoanId::from_uuid(loan_id),
        returned_at: state.clock.now(),
    };
    let outcome = state.engine.return_item(cmd).await?;
    Ok(Json(outcome.into()))
}

/// POST /loans/:id/renew - 更新
pub async fn renew_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<OutcomeResponse<LoanResponse>>, ApiError> {
    let cmd = RenewLoan {
        loan_id: LoanId::from_uuid(loan_id),
        renewed_at: state.clock.now(),
    };
    let outcome = state.engine.renew_loan(cmd).await?;
    Ok(Json(outcome.into()))
}

/// POST /loans/:id/pay-fine - 延滞料の支払い
pub async fn pay_fine(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<OutcomeResponse<LoanResponse>>, ApiError> {
    let cmd = PayFine {
        loan_id: LoanId::from_uuid(loan_id),
        paid_at: state.clock.now(),
    };
    let outcome = state.engine.pay_fine(cmd).await?;
    Ok(Json(outcome.into()))
}

/// GET /loans/:id/fine - 延滞料（なければ null）
pub async fn loan_fine(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<Option<FineResponse>>, ApiError> {
    let loan = state.engine.loan(LoanId::from_uuid(loan_id)).await?;
    Ok(Json(loan.fine.map(FineResponse::from)))
}

// ============================================================================
// Reservations
// ============================================================================

/// POST /reservations - 貸出中の資料を予約
pub async fn reserve_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReserveItemRequest>,
) -> Result<(StatusCode, Json<OutcomeResponse<ReservationResponse>>), ApiError> {
    let outcome = state
        .engine
        .reserve_item(req.to_command(state.clock.now()))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// POST /reservations/:id/cancel - 予約を取り消す
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<OutcomeResponse<ReservationResponse>>, ApiError> {
    let cmd = CancelReservation {
        reservation_id: ReservationId::from_uuid(reservation_id),
        cancelled_at: state.clock.now(),
    };
    let outcome = state.engine.cancel_reservation(cmd).await?;
    Ok(Json(outcome.into()))
}
