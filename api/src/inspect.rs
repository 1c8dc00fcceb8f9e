use serde::Serialize;

/// read-only MP4 container probe, external collaborator per spec.md §1 --
/// the interface is specified only because `/api/inspect` is named in the
/// HTTP surface; the probe logic itself is not part of the core.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResp {
    pub ok: bool,
    pub size: u64,
    pub mtime_ms: i64,
    pub moov_in_head: Option<bool>,
    pub codec_hint: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InspectErrorResp {
    pub ok: bool,
    pub error: String,
}
