pub mod msg;
pub mod queries;
pub mod store;
pub mod svc;

use serde::Serialize;

/// a row of `media_items`, as read back from the store
#[derive(Clone, Debug, Serialize)]
pub struct MediaRow {
    pub dir_id: String,
    pub rel_path: String,
    pub ext: String,
    pub kind: String,
    pub time_text: String,
    pub iso: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub author: String,
    pub theme: String,
    pub type_text: String,
    pub seq: Option<i64>,
    pub mtime_ms: f64,
    pub size: i64,
    pub seen_run: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// the data an Indexer scan pass has already computed for one file, ready
/// to be upserted as a unit
#[derive(Clone, Debug)]
pub struct MediaUpsert {
    pub dir_id: String,
    pub rel_path: String,
    pub ext: String,
    pub kind: String,
    pub time_text: String,
    pub iso: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub author: String,
    pub theme: String,
    pub type_text: String,
    pub seq: Option<i64>,
    pub mtime_ms: f64,
    pub size: i64,
    pub seen_run: i64,
    pub types: Vec<String>,
    pub tags: Vec<String>,
}
