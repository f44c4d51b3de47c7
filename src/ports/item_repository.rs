use async_trait::async_trait;

use super::store::Result;
use crate::domain::{Item, ItemId};

/// 資料リポジトリポート
///
/// 貸出可否は保持しない（貸出から導出する）。
#[async_trait]
pub trait ItemRepository: Send {
    /// 目録に登録する
    ///
    /// 目録番号が重複する場合は`StoreError::Constraint`。
    async fn create(&mut self, item: &Item) -> Result<ItemId>;

    /// 資料を取得し、作業単位の終わりまでロックする
    async fn find_by_id(&mut self, item_id: ItemId) -> Result<Option<Item>>;

    async fn find_by_catalog_number(&mut self, catalog_number: &str) -> Result<Option<Item>>;

    /// 書誌項目を更新する
    async fn update(&mut self, item: &Item) -> Result<()>;

    async fn delete(&mut self, item_id: ItemId) -> Result<()>;
}
