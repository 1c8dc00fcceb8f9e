use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResp {
    pub ok: bool,
    pub media_dirs: Vec<String>,
    pub default_media_dirs: Vec<String>,
    pub from_env: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateReq {
    pub media_dirs: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfigErrorResp {
    pub ok: bool,
    pub error: String,
}
