use chrono::{DateTime, Utc};

/// 時計ポート
///
/// 貸出エンジンは時刻を引数で受け取る。外側（HTTP層など）がこのポートから
/// 現在時刻を取り出して渡す。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
