use serde::{Deserialize, Serialize};

use crate::dir::{DirId, MediaDirOut};
use crate::media::Group;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Publish,
    Ingest,
}

/// the filter set shared by queryResources/queryAuthors/queryTags
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    pub dir_id: Option<DirId>,
    pub q: Option<String>,
    pub tag: Option<String>,
    /// tri-state: absent = unset, present (including "") = exact match
    pub author: Option<String>,
    pub sort: Option<SortMode>,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_more: bool,
    pub total_items: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesResp {
    pub ok: bool,
    pub dirs: Vec<MediaDirOut>,
    pub groups: Vec<Group>,
    pub pagination: Pagination,
}

/// special-case response when no configured dir exists on disk: ok is still
/// carried as `false`, but the HTTP status remains 200 (spec.md error taxonomy)
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoMediaDirResp {
    pub ok: bool,
    pub code: &'static str,
    pub media_dirs: Vec<String>,
    pub default_media_dirs: Vec<String>,
    pub error: String,
}

impl NoMediaDirResp {
    pub fn new(media_dirs: Vec<String>, default_media_dirs: Vec<String>) -> Self {
        NoMediaDirResp {
            ok: false,
            code: "NO_MEDIA_DIR",
            media_dirs,
            default_media_dirs,
            error: "no configured media directory exists on disk".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorEntry {
    pub author: String,
    pub group_count: u64,
    pub item_count: u64,
    pub latest_timestamp_ms: Option<i64>,
    pub latest_item: Option<crate::media::MediaItemOut>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorsResp {
    pub ok: bool,
    pub dirs: Vec<MediaDirOut>,
    pub authors: Vec<AuthorEntry>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    pub tag: String,
    pub group_count: u64,
    pub item_count: u64,
    pub latest_timestamp_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsResp {
    pub ok: bool,
    pub tags: Vec<TagEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsFilter {
    pub q: Option<String>,
    pub dir_id: Option<DirId>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorsFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub q: Option<String>,
    pub dir_id: Option<DirId>,
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    pub tag: Option<String>,
}
