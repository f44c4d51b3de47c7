use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ItemId;

/// 資料の形態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemFormat {
    Physical,
    Electronic { url: String },
}

impl ItemFormat {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemFormat::Physical => "physical",
            ItemFormat::Electronic { .. } => "electronic",
        }
    }
}

/// カタログ上の資料
///
/// 貸出可否は保持しない。常に貸出の状態から導出する。
/// `catalog_number`（ISBN相当）は一意。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub catalog_number: String,
    pub title: String,
    pub author: String,
    pub pages: u32,
    pub category: String,
    pub format: ItemFormat,
    pub cataloged_at: DateTime<Utc>,
}

/// 目録登録の入力
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub catalog_number: String,
    pub title: String,
    pub author: String,
    pub pages: u32,
    pub category: String,
    pub format: ItemFormat,
}

/// 目録の変更可能な項目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
}

impl Item {
    pub fn catalog(new_item: NewItem, cataloged_at: DateTime<Utc>) -> Self {
        Self {
            item_id: ItemId::new(),
            catalog_number: normalize_catalog_number(&new_item.catalog_number),
            title: new_item.title,
            author: new_item.author,
            pages: new_item.pages,
            category: new_item.category,
            format: new_item.format,
            cataloged_at,
        }
    }

    /// 変更を適用した新しい資料を返す（識別子と目録番号は不変）
    pub fn apply(&self, changes: ItemChanges) -> Self {
        Self {
            title: changes.title.unwrap_or_else(|| self.title.clone()),
            author: changes.author.unwrap_or_else(|| self.author.clone()),
            category: changes.category.unwrap_or_else(|| self.category.clone()),
            ..self.clone()
        }
    }
}

/// 目録番号の区切り文字を取り除く
///
/// "978-85-359-1484-9" と "9788535914849" を同じ資料として扱う。
pub fn normalize_catalog_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
