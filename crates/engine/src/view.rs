//! Record views returned by the facade

use morphic_core::RecordId;
use morphic_store::Page;
use serde::Serialize;
use serde_json::{Map, Value};

/// A record as a JSON object: `id`, attribute values, nested related
/// records, then `created_at` and `updated_at`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecordView(Map<String, Value>);

impl RecordView {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.0.get("id").and_then(Value::as_i64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RecordView {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Pagination block of a [`RecordPage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub current_page: u64,
    pub from: Option<u64>,
    pub last_page: u64,
    pub per_page: u64,
    pub to: Option<u64>,
    pub total: u64,
}

impl<T> From<&Page<T>> for PageMeta {
    fn from(page: &Page<T>) -> Self {
        Self {
            current_page: page.page,
            from: page.from(),
            last_page: page.last_page(),
            per_page: page.per_page,
            to: page.to(),
            total: page.total,
        }
    }
}

/// One page of record views
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub data: Vec<RecordView>,
    pub meta: PageMeta,
}
