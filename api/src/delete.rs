use serde::{Deserialize, Serialize};

use crate::dir::DirId;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItem {
    pub dir_id: DirId,
    pub filename: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeleteReq {
    pub items: Vec<DeleteItem>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemResult {
    pub ok: bool,
    pub dir_id: DirId,
    pub filename: String,
    pub skipped: Option<&'static str>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeleteResp {
    pub ok: bool,
    pub deleted: u64,
    pub failed: u64,
    pub results: Vec<DeleteItemResult>,
}
